//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Cache capacity must be at least 1")]
    InvalidCapacity,

    #[error("Backend pool requires at least one backend")]
    NoBackends,

    #[error("None of the {0} configured backends is marked alive")]
    NoLiveBackends(usize),
}
