//! Error types for the record engine.

use thiserror::Error;

/// Result type for record-engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in record-engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing-store error.
    #[error("store error: {0}")]
    Store(#[from] kvrecord_store::StoreError),

    /// A strict lookup found no record.
    #[error("record not found: {type_name} {id}")]
    NotFound {
        /// The entity type that was searched.
        type_name: String,
        /// The id that was not found.
        id: i64,
    },

    /// A schema or association is declared or used incorrectly.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the misconfiguration.
        message: String,
    },

    /// A zero or absent id was registered into a type-set.
    #[error("invalid identity for type {type_name}")]
    InvalidIdentity {
        /// The entity type whose identity was invalid.
        type_name: String,
    },

    /// An operation was attempted on an instance in the wrong state.
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the violated precondition.
        message: String,
    },
}

impl CoreError {
    /// Creates a not-found error.
    pub fn not_found(type_name: impl Into<String>, id: i64) -> Self {
        Self::NotFound {
            type_name: type_name.into(),
            id,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an invalid-identity error.
    pub fn invalid_identity(type_name: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            type_name: type_name.into(),
        }
    }

    /// Creates a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }
}
