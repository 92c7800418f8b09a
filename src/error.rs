use thiserror::Error;

use crate::cursor::CursorState;
use crate::record::RecordId;

/// Result alias used throughout the store.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for every store, cursor and backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Read or delete of an id the table does not hold.
    #[error("record not found: {table}:{id}")]
    NotFound { table: String, id: RecordId },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The backend was never bound to a store, or the table was never registered.
    #[error("model {table} is not registered with a backend store")]
    ModelNotRegistered { table: String },

    #[error(transparent)]
    Field(#[from] FieldError),
}

impl StoreError {
    pub(crate) fn not_found(table: &str, id: RecordId) -> Self {
        StoreError::NotFound {
            table: table.to_string(),
            id,
        }
    }

    pub(crate) fn not_registered(table: &str) -> Self {
        StoreError::ModelNotRegistered {
            table: table.to_string(),
        }
    }

    /// True for errors that a caller can resolve by retrying with a fresh cursor.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Transaction(TransactionError::Conflict { .. })
                | StoreError::Storage(StorageError::Timeout { .. })
        )
    }
}

/// Failures of the underlying storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("id space of {table} is exhausted")]
    IdsExhausted { table: String },

    #[error("storage i/o failure: {0}")]
    Io(String),

    #[error("codec error: {0}")]
    Codec(String),
}

/// Commit-time failures. A store that reports one of these is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Another commit changed a record this cursor observed.
    #[error("commit conflict on {table}:{id} (expected version {expected}, actual {actual})")]
    Conflict {
        table: String,
        id: RecordId,
        expected: u64,
        actual: u64,
    },

    /// Applying the batch failed part way; the applied prefix was undone.
    #[error("commit aborted after {applied} operations and rolled back: {source}")]
    Aborted {
        applied: usize,
        source: StorageError,
    },

    #[error("cursor is {state}; acquire a new one")]
    Closed { state: CursorState },
}

/// Field map problems detected before the store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field {field} has no value for {table}")]
    Required { table: String, field: String },

    #[error("'{field}' is an invalid field for {table}")]
    Unknown { table: String, field: String },

    #[error("field {field} of {table} is not indexed")]
    NotIndexed { table: String, field: String },

    /// An index pair whose value is not the value the record holds.
    #[error("index value for {table}.{field} does not match the record")]
    IndexMismatch { table: String, field: String },
}

/// A cascading delete that stopped part way.
///
/// `removed` counts the records deleted before `source` was hit; those
/// deletions stay committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cascade delete failed after removing {removed} records: {source}")]
pub struct CascadeError {
    pub removed: usize,
    pub source: StoreError,
}

impl CascadeError {
    pub(crate) fn new(removed: usize, source: StoreError) -> Self {
        CascadeError { removed, source }
    }
}
