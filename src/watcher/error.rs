//! Error types for the watcher and its runtime controls.

use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::FetchError;
use crate::state::StateError;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Interval too low: {requested}s (minimum {minimum}s)")]
    IntervalTooShort { requested: u64, minimum: u64 },

    #[error("Server name must not be empty")]
    EmptyName,

    #[error("Invalid sink target '{target}': {reason}")]
    InvalidSinkTarget { target: String, reason: String },

    #[error("Sink '{sink}' failed to deliver: {reason}")]
    Delivery { sink: String, reason: String },

    #[error("A poll cycle is already running")]
    CycleInProgress,

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Settings(#[from] ConfigError),
}
