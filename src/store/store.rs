//! RecordStore - abstract table storage with secondary indexes.

use std::collections::BTreeSet;

use super::{Batch, Operation};
use crate::error::{Result, StoreError};
use crate::meta::ModelMeta;
use crate::record::{Fields, Record, RecordId, RecordKey};

/// Abstract storage for records, their indexes and id counters.
///
/// Implementations must apply a [`Batch`] atomically: either every operation
/// and its index updates become visible, or none do. Store handles are
/// expected to be cheap to clone and share one underlying state.
pub trait RecordStore: Send + Sync {
    /// Create a table, or replace its schema and reindex existing records.
    fn register(&self, meta: ModelMeta) -> Result<()>;

    /// Schema of a registered table.
    fn meta(&self, table: &str) -> Result<ModelMeta>;

    /// Get a record by id. Fails with `NotFound` if absent.
    fn get(&self, table: &str, id: RecordId) -> Result<Record>;

    /// Ids whose indexed `field` holds `value`.
    fn lookup(&self, table: &str, field: &str, value: &str) -> Result<BTreeSet<RecordId>>;

    /// Records whose `field` holds `value`, through the index when the field
    /// is indexed and by scanning otherwise.
    fn filter(&self, table: &str, field: &str, value: &str) -> Result<Vec<Record>>;

    /// All ids of a table in ascending order.
    fn ids(&self, table: &str) -> Result<Vec<RecordId>>;

    fn len(&self, table: &str) -> Result<usize>;

    /// Remove every record and index entry of a table. Returns records removed.
    fn truncate(&self, table: &str) -> Result<usize>;

    /// Truncate several tables as one step: every table is checked first,
    /// then all are cleared together. Returns records removed.
    fn truncate_all(&self, tables: &[String]) -> Result<usize>;

    /// Recompute a table's indexes from its records.
    fn rebuild_indexes(&self, table: &str) -> Result<()>;

    /// Hand out the next unused id of a table.
    fn allocate_id(&self, table: &str) -> Result<RecordId>;

    /// Make sure a caller-chosen id is never handed out by `allocate_id`.
    fn reserve_id(&self, table: &str, id: RecordId) -> Result<()>;

    /// Commit version of a record, `0` when absent.
    fn version_of(&self, table: &str, id: RecordId) -> Result<u64>;

    /// Validate observed versions and apply every operation, or nothing.
    /// Returns the number of operations applied.
    fn apply(&self, batch: Batch) -> Result<usize>;

    fn is_empty(&self, table: &str) -> Result<bool> {
        Ok(self.len(table)? == 0)
    }

    fn contains(&self, table: &str, id: RecordId) -> Result<bool> {
        Ok(self.version_of(table, id)? != 0)
    }

    /// Persist a full field map, assigning an id when none is given.
    /// Index pairs are derived from the table's indexed fields.
    fn put(&self, table: &str, id: Option<RecordId>, fields: Fields) -> Result<RecordId> {
        let meta = self.meta(table)?;
        let id = match id {
            Some(id) => {
                self.reserve_id(table, id)?;
                id
            }
            None => self.allocate_id(table)?,
        };

        let mut batch = Batch::new();
        batch.observe(RecordKey::new(table, id), self.version_of(table, id)?);
        batch.push(Operation::Put {
            table: table.to_string(),
            id,
            indexes: meta.index_pairs(&fields),
            fields,
        });
        self.apply(batch)?;
        Ok(id)
    }

    /// Delete a record. Returns the count removed.
    fn delete(&self, table: &str, id: RecordId) -> Result<usize> {
        let version = self.version_of(table, id)?;
        if version == 0 {
            return Err(StoreError::not_found(table, id));
        }

        let mut batch = Batch::new();
        batch.observe(RecordKey::new(table, id), version);
        batch.push(Operation::Delete {
            table: table.to_string(),
            id,
        });
        self.apply(batch)
    }
}
