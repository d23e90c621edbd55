//! Shared error type for the pipeline stores.
//!
//! The queue, scheduled-action, and notification-log stores all fail the same
//! ways: the backing database rejected an operation, a row that should exist
//! does not, or a payload column would not round-trip. Keeping one error type
//! lets the workers treat any storage failure as a row-attempt failure
//! without caring which table it came from.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in a pipeline store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database rejected the operation.
    #[error("Database error: {0}")]
    Database(String),

    /// A row that was expected to exist could not be found.
    #[error("Entry not found: {0}")]
    NotFound(Uuid),

    /// A stored value could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
