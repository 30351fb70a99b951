//! Round-robin backend selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use crate::error::CoreError;

/// A backend application the proxy forwards to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    pub host: String,
    /// Port 0 leaves the port out of the URL (scheme default)
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Backends marked not alive are drained from the rotation
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_alive() -> bool {
    true
}

impl BackendDescriptor {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: false,
            alive: true,
        }
    }

    /// URL prefix requests are appended to, e.g. `https://api.internal:8443`
    pub fn base_url(&self) -> String {
        let scheme = if self.tls { "https" } else { "http" };
        if self.port == 0 {
            format!("{}://{}", scheme, self.host)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

impl fmt::Display for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Fixed, ordered set of backends selected in strict rotation
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<BackendDescriptor>,
    counter: AtomicUsize,
}

impl BackendPool {
    /// Build a pool from configured backends.
    ///
    /// Backends with `alive = false` are left out of the rotation. Fails when
    /// no backends are configured or none of them is alive.
    pub fn new(backends: Vec<BackendDescriptor>) -> Result<Self, CoreError> {
        if backends.is_empty() {
            return Err(CoreError::NoBackends);
        }

        let configured = backends.len();
        let (live, drained): (Vec<_>, Vec<_>) = backends.into_iter().partition(|b| b.alive);

        for backend in &drained {
            warn!("Backend {} is marked not alive, leaving it out of rotation", backend);
        }

        if live.is_empty() {
            return Err(CoreError::NoLiveBackends(configured));
        }

        for backend in &live {
            info!("Loaded backend: {}", backend);
        }

        Ok(Self {
            backends: live,
            counter: AtomicUsize::new(0),
        })
    }

    /// Return the next backend in rotation.
    ///
    /// The counter only ever grows (wrapping on overflow) and is reduced
    /// modulo the pool size, so concurrent callers never skip or repeat a slot.
    pub fn next(&self) -> &BackendDescriptor {
        let position = self.counter.fetch_add(1, Ordering::Relaxed);
        &self.backends[position % self.backends.len()]
    }

    /// Backends in rotation order
    pub fn backends(&self) -> &[BackendDescriptor] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
