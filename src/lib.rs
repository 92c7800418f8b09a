mod backend;
mod config;
mod cursor;
mod error;
mod index;
mod meta;
mod record;
#[cfg(feature = "emitter")]
mod signals;
mod store;

pub use backend::Backend;
pub use config::{StoreConfig, DEFAULT_LOCK_TIMEOUT_MS};
pub use cursor::{Cursor, CursorState};
pub use error::{CascadeError, FieldError, Result, StorageError, StoreError, TransactionError};
pub use index::IndexManager;
pub use meta::{fields_of, FieldSpec, ModelMeta, Prepared, Relation};
pub use record::{Fields, IndexPair, Record, RecordId, RecordKey};
#[cfg(feature = "emitter")]
pub use signals::{CommitSignal, DeleteSignal, Signals, POST_COMMIT, POST_DELETE};
pub use store::{Batch, FaultPlan, InMemoryRecordStore, Operation, RecordStore};

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
