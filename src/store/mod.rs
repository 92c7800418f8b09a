//! Record stores - tables of field maps with their secondary indexes.
//!
//! A store holds one table per registered [`ModelMeta`]. Every write goes
//! through [`RecordStore::apply`], which validates the versions a cursor
//! observed and then applies the whole [`Batch`] or nothing.
//!
//! ## Example
//!
//! ```ignore
//! use stdnet_rust::{FieldSpec, InMemoryRecordStore, ModelMeta, RecordStore};
//!
//! let store = InMemoryRecordStore::new();
//! store.register(ModelMeta::new("users").field(FieldSpec::new("name").indexed()))?;
//!
//! let id = store.put("users", None, fields)?;
//! let ids = store.lookup("users", "name", "a")?;
//! ```

mod fault;
mod in_memory;
mod snapshot;
mod store;

use std::collections::BTreeMap;

use crate::record::{Fields, IndexPair, RecordId, RecordKey};

pub use fault::FaultPlan;
pub use in_memory::InMemoryRecordStore;
pub use store::RecordStore;

/// A single staged change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Full overwrite of a record and its index pairs.
    Put {
        table: String,
        id: RecordId,
        fields: Fields,
        indexes: Vec<IndexPair>,
    },
    Delete {
        table: String,
        id: RecordId,
    },
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Operation::Put { table, .. } | Operation::Delete { table, .. } => table,
        }
    }

    pub fn id(&self) -> RecordId {
        match self {
            Operation::Put { id, .. } | Operation::Delete { id, .. } => *id,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.table(), self.id())
    }
}

/// Operations to apply atomically, plus the record versions they were
/// staged against. Version `0` means the record was absent.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    operations: Vec<Operation>,
    observed: BTreeMap<RecordKey, u64>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the version seen for `key`. The first observation wins.
    pub fn observe(&mut self, key: RecordKey, version: u64) {
        self.observed.entry(key).or_insert(version);
    }

    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn observed(&self) -> &BTreeMap<RecordKey, u64> {
        &self.observed
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}
