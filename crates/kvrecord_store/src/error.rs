//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during backing-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred while talking to the store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A command was issued against a key holding a different value kind.
    #[error("wrong value kind at key {key}: expected {expected}")]
    WrongType {
        /// The key that was accessed.
        key: String,
        /// The value kind the command requires.
        expected: &'static str,
    },

    /// The store connection is closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Creates a wrong-type error for a key.
    pub fn wrong_type(key: impl Into<String>, expected: &'static str) -> Self {
        Self::WrongType {
            key: key.into(),
            expected,
        }
    }
}
