//! Fixed-capacity least-recently-used store
//!
//! Entries live in an arena (`Vec`) and are addressed by slot index. Two
//! sentinel slots bound a doubly linked recency list: the slot after `HEAD`
//! is the most recently used entry, the slot before `TAIL` the least recently
//! used one. A `HashMap` maps each key to its slot. Released slots are kept on
//! a free list and reused by later insertions.
//!
//! The store itself is not synchronized; [`ResponseCache`](super::ResponseCache)
//! wraps it in a mutex for shared use.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::error::CoreError;

const HEAD: usize = 0;
const TAIL: usize = 1;

struct Node<K, V> {
    /// `None` for the two sentinels and for slots on the free list
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
}

impl<K, V> Node<K, V> {
    fn sentinel() -> Self {
        Self {
            entry: None,
            prev: HEAD,
            next: TAIL,
        }
    }
}

/// Bounded key/value store with LRU eviction and O(1) operations
pub struct LruStore<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    free: Vec<usize>,
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity);
        }

        Ok(Self {
            capacity,
            map: HashMap::new(),
            nodes: vec![Node::sentinel(), Node::sentinel()],
            free: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Look up a key and mark it as most recently used
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.promote(idx);
        self.nodes[idx].entry.as_ref().map(|(_, value)| value)
    }

    /// Look up a key without touching its recency
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;
        self.nodes[idx].entry.as_ref().map(|(_, value)| value)
    }

    /// Insert or replace a value, marking it as most recently used.
    ///
    /// Returns the entry evicted to stay within capacity, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some((_, slot)) = self.nodes[idx].entry.as_mut() {
                *slot = value;
            }
            self.promote(idx);
            return None;
        }

        let idx = self.allocate(key.clone(), value);
        self.map.insert(key, idx);
        self.attach_front(idx);

        if self.map.len() > self.capacity {
            self.pop_lru()
        } else {
            None
        }
    }

    /// Remove a key, returning its value if it was present
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        self.free.push(idx);
        self.nodes[idx].entry.take().map(|(_, value)| value)
    }

    /// Evict the least recently used entry
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let idx = self.nodes[TAIL].prev;
        if idx == HEAD {
            return None;
        }

        self.detach(idx);
        self.free.push(idx);
        let (key, value) = self.nodes[idx].entry.take()?;
        self.map.remove(&key);
        Some((key, value))
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.map.len();
        self.map.clear();
        self.free.clear();
        self.nodes.truncate(2);
        self.nodes[HEAD] = Node::sentinel();
        self.nodes[TAIL] = Node::sentinel();
        removed
    }

    /// Keys ordered from most to least recently used
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys {
            nodes: &self.nodes,
            cursor: self.nodes[HEAD].next,
        }
    }

    fn allocate(&mut self, key: K, value: V) -> usize {
        let node = Node {
            entry: Some((key, value)),
            prev: HEAD,
            next: TAIL,
        };

        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.nodes[HEAD].next == idx {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.nodes[idx].prev, self.nodes[idx].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn attach_front(&mut self, idx: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[idx].prev = HEAD;
        self.nodes[idx].next = first;
        self.nodes[first].prev = idx;
        self.nodes[HEAD].next = idx;
    }
}

impl<K: fmt::Debug, V> fmt::Debug for LruStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys = Keys {
            nodes: &self.nodes,
            cursor: self.nodes[HEAD].next,
        };
        f.debug_struct("LruStore")
            .field("capacity", &self.capacity)
            .field("len", &self.map.len())
            .field("mru_to_lru", &keys.collect::<Vec<_>>())
            .finish()
    }
}

/// Iterator over keys in recency order, see [`LruStore::keys`]
pub struct Keys<'a, K, V> {
    nodes: &'a [Node<K, V>],
    cursor: usize,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == TAIL {
            return None;
        }
        let node = &self.nodes[self.cursor];
        self.cursor = node.next;
        node.entry.as_ref().map(|(key, _)| key)
    }
}
