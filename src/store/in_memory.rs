//! InMemoryRecordStore - HashMap-backed record store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use super::{Batch, FaultPlan, Operation, RecordStore};
use crate::config::StoreConfig;
use crate::error::{Result, StorageError, StoreError, TransactionError};
use crate::index::IndexManager;
use crate::meta::ModelMeta;
use crate::record::{Fields, IndexPair, Record, RecordId};

/// Internal stored representation of a record.
#[derive(Debug, Clone)]
pub(super) struct StoredRecord {
    pub(super) fields: Fields,
    pub(super) indexes: Vec<IndexPair>,
    pub(super) version: u64,
}

pub(super) struct Table {
    pub(super) meta: ModelMeta,
    pub(super) records: BTreeMap<RecordId, StoredRecord>,
    pub(super) indexes: IndexManager,
    /// Highest id handed out or reserved.
    pub(super) next_id: u64,
}

impl Table {
    pub(super) fn new(meta: ModelMeta) -> Self {
        Table {
            meta,
            records: BTreeMap::new(),
            indexes: IndexManager::new(),
            next_id: 0,
        }
    }

    fn version_of(&self, id: RecordId) -> u64 {
        self.records.get(&id).map(|r| r.version).unwrap_or(0)
    }

    pub(super) fn reindex(&mut self) {
        self.indexes.rebuild(
            self.records
                .iter()
                .map(|(id, record)| (*id, record.indexes.as_slice())),
        );
    }

    /// Replace (or remove, for `None`) a record and move its index entries.
    /// Returns the prior record.
    fn write(&mut self, id: RecordId, next: Option<StoredRecord>) -> Option<StoredRecord> {
        let old_pairs = self
            .records
            .get(&id)
            .map(|r| r.indexes.clone())
            .unwrap_or_default();
        let new_pairs = next.as_ref().map(|r| r.indexes.clone()).unwrap_or_default();
        self.indexes.update(id, &old_pairs, &new_pairs);

        match next {
            Some(record) => self.records.insert(id, record),
            None => self.records.remove(&id),
        }
    }
}

#[derive(Default)]
pub(super) struct StoreState {
    pub(super) tables: HashMap<String, Table>,
    /// Version stamped on the most recent commit.
    pub(super) sequence: u64,
}

/// Prior state of one record touched by an in-flight commit.
struct Undo {
    table: String,
    id: RecordId,
    prior: Option<StoredRecord>,
}

impl StoreState {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::not_registered(name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StoreError::not_registered(name))
    }

    fn apply_one(&mut self, operation: Operation, version: u64) -> Undo {
        let (table, id, next) = match operation {
            Operation::Put {
                table,
                id,
                fields,
                indexes,
            } => (
                table,
                id,
                Some(StoredRecord {
                    fields,
                    indexes,
                    version,
                }),
            ),
            Operation::Delete { table, id } => (table, id, None),
        };
        let prior = self.tables.get_mut(&table).and_then(|t| t.write(id, next));
        Undo { table, id, prior }
    }

    fn undo(&mut self, log: Vec<Undo>) {
        for entry in log.into_iter().rev() {
            if let Some(table) = self.tables.get_mut(&entry.table) {
                table.write(entry.id, entry.prior);
            }
        }
    }
}

/// In-memory record store.
///
/// Tables, indexes and id counters live behind one `RwLock`; commits take the
/// write side for validation and application, so a commit is never observed
/// half-applied. Every lock wait is bounded by `StoreConfig::lock_timeout`.
/// Clone-friendly via Arc.
#[derive(Clone)]
pub struct InMemoryRecordStore {
    pub(super) state: Arc<RwLock<StoreState>>,
    pub(super) config: StoreConfig,
    faults: Arc<FaultPlan>,
}

impl std::fmt::Debug for InMemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRecordStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    /// Create a new empty store with default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::from_state(StoreState::default(), config)
    }

    pub(super) fn from_state(state: StoreState, config: StoreConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            config,
            faults: Arc::new(FaultPlan::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Fault injection shared by every clone of this store.
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Names of all registered tables.
    pub fn tables(&self) -> Result<Vec<String>> {
        let state = self.read("tables")?;
        let mut names: Vec<String> = state.tables.keys().cloned().collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Number of distinct index entries of a table.
    pub fn index_entries(&self, table: &str) -> Result<usize> {
        let state = self.read("index_entries")?;
        Ok(state.table(table)?.indexes.entry_count())
    }

    pub(super) fn read(&self, operation: &'static str) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .try_read_for(self.config.lock_timeout())
            .ok_or_else(|| self.timed_out(operation))
    }

    pub(super) fn write(
        &self,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .try_write_for(self.config.lock_timeout())
            .ok_or_else(|| self.timed_out(operation))
    }

    /// Run `f` while another holder keeps the store write-locked.
    #[cfg(test)]
    pub(crate) fn while_locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.state.write();
        f()
    }

    fn timed_out(&self, operation: &'static str) -> StoreError {
        warn!(operation, timeout_ms = self.config.lock_timeout_ms, "store lock timed out");
        StorageError::Timeout {
            operation,
            timeout_ms: self.config.lock_timeout_ms,
        }
        .into()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn register(&self, meta: ModelMeta) -> Result<()> {
        let mut state = self.write("register")?;
        let name = meta.name().to_string();

        match state.tables.get_mut(&name) {
            Some(table) => {
                for record in table.records.values_mut() {
                    record.indexes = meta.index_pairs(&record.fields);
                }
                table.meta = meta;
                table.reindex();
                debug!(table = %name, records = table.records.len(), "table schema replaced");
            }
            None => {
                state.tables.insert(name.clone(), Table::new(meta));
                debug!(table = %name, "table registered");
            }
        }
        Ok(())
    }

    fn meta(&self, table: &str) -> Result<ModelMeta> {
        let state = self.read("meta")?;
        Ok(state.table(table)?.meta.clone())
    }

    fn get(&self, table: &str, id: RecordId) -> Result<Record> {
        let state = self.read("get")?;
        state
            .table(table)?
            .records
            .get(&id)
            .map(|stored| Record::new(id, stored.fields.clone()))
            .ok_or_else(|| StoreError::not_found(table, id))
    }

    fn lookup(&self, table: &str, field: &str, value: &str) -> Result<BTreeSet<RecordId>> {
        let state = self.read("lookup")?;
        Ok(state.table(table)?.indexes.lookup(field, value))
    }

    fn filter(&self, table: &str, field: &str, value: &str) -> Result<Vec<Record>> {
        let state = self.read("filter")?;
        let table = state.table(table)?;

        let records = if table.meta.is_indexed(field) {
            table
                .indexes
                .lookup(field, value)
                .into_iter()
                .filter_map(|id| {
                    table
                        .records
                        .get(&id)
                        .map(|stored| Record::new(id, stored.fields.clone()))
                })
                .collect()
        } else {
            table
                .records
                .iter()
                .filter(|(_, stored)| stored.fields.get(field).map(String::as_str) == Some(value))
                .map(|(id, stored)| Record::new(*id, stored.fields.clone()))
                .collect()
        };
        Ok(records)
    }

    fn ids(&self, table: &str) -> Result<Vec<RecordId>> {
        let state = self.read("ids")?;
        Ok(state.table(table)?.records.keys().copied().collect())
    }

    fn len(&self, table: &str) -> Result<usize> {
        let state = self.read("len")?;
        Ok(state.table(table)?.records.len())
    }

    fn truncate(&self, table: &str) -> Result<usize> {
        let mut state = self.write("truncate")?;
        let entry = state.table_mut(table)?;
        let removed = entry.records.len();
        entry.records.clear();
        entry.indexes.clear();
        debug!(table, removed, "table truncated");
        Ok(removed)
    }

    fn truncate_all(&self, tables: &[String]) -> Result<usize> {
        let mut state = self.write("truncate_all")?;
        for table in tables {
            state.table(table)?;
        }

        let mut removed = 0;
        for table in tables {
            let entry = state.table_mut(table)?;
            removed += entry.records.len();
            entry.records.clear();
            entry.indexes.clear();
        }
        debug!(tables = tables.len(), removed, "tables truncated");
        Ok(removed)
    }

    fn rebuild_indexes(&self, table: &str) -> Result<()> {
        let mut state = self.write("rebuild_indexes")?;
        let entry = state.table_mut(table)?;
        entry.reindex();
        debug!(table, entries = entry.indexes.entry_count(), "indexes rebuilt");
        Ok(())
    }

    fn allocate_id(&self, table: &str) -> Result<RecordId> {
        let mut state = self.write("allocate_id")?;
        let entry = state.table_mut(table)?;
        let Some(next) = entry.next_id.checked_add(1) else {
            warn!(table, "id space exhausted");
            return Err(StorageError::IdsExhausted {
                table: table.to_string(),
            }
            .into());
        };
        entry.next_id = next;
        Ok(RecordId(next))
    }

    fn reserve_id(&self, table: &str, id: RecordId) -> Result<()> {
        let mut state = self.write("reserve_id")?;
        let entry = state.table_mut(table)?;
        entry.next_id = entry.next_id.max(id.get());
        Ok(())
    }

    fn version_of(&self, table: &str, id: RecordId) -> Result<u64> {
        let state = self.read("version_of")?;
        Ok(state.table(table)?.version_of(id))
    }

    fn apply(&self, batch: Batch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut state = self.write("commit")?;

        for operation in batch.operations() {
            state.table(operation.table())?;
        }
        for (key, expected) in batch.observed() {
            let actual = state.table(&key.table)?.version_of(key.id);
            if actual != *expected {
                warn!(
                    table = %key.table,
                    id = %key.id,
                    expected = *expected,
                    actual,
                    "commit conflict"
                );
                return Err(TransactionError::Conflict {
                    table: key.table.clone(),
                    id: key.id,
                    expected: *expected,
                    actual,
                }
                .into());
            }
        }

        let version = state.sequence + 1;
        let total = batch.len();
        let mut undo = Vec::with_capacity(total);

        for operation in batch.into_operations() {
            if let Err(source) = self.faults.check() {
                let applied = undo.len();
                state.undo(undo);
                warn!(applied, total, error = %source, "commit failed, rolled back");
                return Err(TransactionError::Aborted { applied, source }.into());
            }
            undo.push(state.apply_one(operation, version));
        }

        state.sequence = version;
        debug!(version, applied = total, "commit applied");
        Ok(total)
    }
}
