//! Backend - the store-facing side of one model.
//!
//! A backend pairs a [`ModelMeta`] with an explicitly injected store handle
//! and exposes the operations the model layer calls: `add_object`,
//! `delete_object`, `commit` and `flush`. Writes staged with `commit = false`
//! accumulate in the backend's pending cursor until `commit`.
//!
//! ## Example
//!
//! ```ignore
//! let store = InMemoryRecordStore::new();
//! let users = Backend::bind(users_meta, store.clone())?;
//!
//! users.add_object(None, fields, indexes, false)?;
//! users.add_object(None, more_fields, more_indexes, false)?;
//! assert_eq!(users.commit()?, 2);
//!
//! let mut deleted = Vec::new();
//! users.delete_object(id, &mut deleted)?;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cursor::Cursor;
use crate::error::{CascadeError, Result, StoreError};
use crate::meta::ModelMeta;
use crate::record::{Fields, IndexPair, Record, RecordId, RecordKey};
use crate::store::{InMemoryRecordStore, RecordStore};

#[cfg(feature = "emitter")]
use crate::signals::{CommitSignal, DeleteSignal, Signals, POST_COMMIT, POST_DELETE};

/// Facade between a model and its record store.
pub struct Backend<S: RecordStore + Clone = InMemoryRecordStore> {
    meta: ModelMeta,
    store: Option<S>,
    pending: Mutex<Option<Cursor<S>>>,
    #[cfg(feature = "emitter")]
    signals: Signals,
}

impl<S: RecordStore + Clone> Backend<S> {
    /// A backend with no store. Every operation fails with `ModelNotRegistered`.
    pub fn unbound(meta: ModelMeta) -> Self {
        Backend {
            meta,
            store: None,
            pending: Mutex::new(None),
            #[cfg(feature = "emitter")]
            signals: Signals::new(),
        }
    }

    /// Register `meta` with `store` and bind to it.
    pub fn bind(meta: ModelMeta, store: S) -> Result<Self> {
        let mut backend = Self::unbound(meta);
        backend.bind_to(store)?;
        Ok(backend)
    }

    /// Rebind to another store. Pending work for the old store is discarded.
    pub fn bind_to(&mut self, store: S) -> Result<()> {
        store.register(self.meta.clone())?;
        *self.pending.get_mut() = None;
        self.store = Some(store);
        debug!(table = self.meta.name(), "backend bound");
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.store.is_some()
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub fn table(&self) -> &str {
        self.meta.name()
    }

    /// The bound store.
    pub fn store(&self) -> Result<&S> {
        self.store
            .as_ref()
            .ok_or_else(|| StoreError::not_registered(self.meta.name()))
    }

    #[cfg(feature = "emitter")]
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    /// Stage a full overwrite of a record, committing the pending cursor
    /// right away when `commit` is true.
    ///
    /// `indexes` pairs naming an unindexed field, or carrying a value the
    /// field map does not hold, fail with a `FieldError` and stage nothing.
    pub fn add_object(
        &self,
        id: Option<RecordId>,
        fields: Fields,
        indexes: Vec<IndexPair>,
        commit: bool,
    ) -> Result<RecordId> {
        let store = self.store()?;
        let mut pending = self.pending.lock();

        let cursor = pending.get_or_insert_with(|| Cursor::new(store.clone()));
        let id = cursor.stage_put(self.table(), id, fields, indexes)?;

        if commit {
            self.commit_pending(&mut pending)?;
        }
        Ok(id)
    }

    /// Validate loose values against the schema, then `add_object` them.
    pub fn save(&self, id: Option<RecordId>, values: Fields, commit: bool) -> Result<RecordId> {
        self.store()?;
        let prepared = self.meta.prepare(values)?;
        self.add_object(id, prepared.fields, prepared.indexes, commit)
    }

    /// Commit the pending cursor. The next write starts a fresh one.
    pub fn commit(&self) -> Result<usize> {
        self.store()?;
        let mut pending = self.pending.lock();
        self.commit_pending(&mut pending)
    }

    /// Discard the pending cursor. Returns how many operations were dropped.
    pub fn rollback(&self) -> Result<usize> {
        self.store()?;
        match self.pending.lock().take() {
            Some(mut cursor) => cursor.rollback(),
            None => Ok(0),
        }
    }

    /// Operations staged and not yet committed.
    pub fn pending(&self) -> usize {
        self.pending.lock().as_ref().map_or(0, Cursor::len)
    }

    pub fn get(&self, id: RecordId) -> Result<Record> {
        self.store()?.get(self.table(), id)
    }

    pub fn lookup(&self, field: &str, value: &str) -> Result<BTreeSet<RecordId>> {
        self.store()?.lookup(self.table(), field, value)
    }

    pub fn filter(&self, field: &str, value: &str) -> Result<Vec<Record>> {
        self.store()?.filter(self.table(), field, value)
    }

    pub fn count(&self) -> Result<usize> {
        self.store()?.len(self.table())
    }

    /// Delete a record and, first, everything that depends on it through
    /// declared relations. Each removed key is appended to `dlist`.
    ///
    /// Every removal commits on its own. On failure the error carries the
    /// number of records already removed.
    pub fn delete_object(
        &self,
        id: RecordId,
        dlist: &mut Vec<RecordKey>,
    ) -> std::result::Result<usize, CascadeError> {
        let store = self.store().map_err(|e| CascadeError::new(0, e))?;
        let plan = cascade_plan(store, RecordKey::new(self.table(), id))
            .map_err(|e| CascadeError::new(0, e))?;

        let mut removed = 0;
        for key in plan {
            let mut cursor = Cursor::new(store.clone());
            let result = cursor
                .stage_delete(&key.table, key.id)
                .and_then(|()| cursor.commit());
            if let Err(source) = result {
                warn!(record = %key, removed, error = %source, "cascade delete stopped");
                return Err(CascadeError::new(removed, source));
            }

            removed += 1;
            #[cfg(feature = "emitter")]
            self.signals.emit(
                POST_DELETE,
                &DeleteSignal {
                    table: key.table.clone(),
                    id: key.id,
                },
            );
            dlist.push(key);
        }

        debug!(table = self.table(), %id, removed, "cascade delete");
        Ok(removed)
    }

    /// Truncate this table and every table reachable through relations,
    /// indexes included, in one store step. Returns the records removed.
    pub fn flush(&self) -> Result<usize> {
        let store = self.store()?;
        let tables = related_tables(store, self.table())?;
        let removed = store.truncate_all(&tables)?;
        debug!(table = self.table(), removed, "flushed");
        Ok(removed)
    }

    /// What `flush` would remove, per table, without removing anything.
    pub fn count_pending_flush(&self) -> Result<BTreeMap<String, usize>> {
        let store = self.store()?;
        let mut counts = BTreeMap::new();
        for table in related_tables(store, self.table())? {
            let len = store.len(&table)?;
            counts.insert(table, len);
        }
        Ok(counts)
    }

    fn commit_pending(&self, pending: &mut Option<Cursor<S>>) -> Result<usize> {
        let Some(mut cursor) = pending.take() else {
            return Ok(0);
        };
        let applied = cursor.commit()?;

        #[cfg(feature = "emitter")]
        if applied > 0 {
            self.signals.emit(
                POST_COMMIT,
                &CommitSignal {
                    table: self.table().to_string(),
                    applied,
                },
            );
        }
        Ok(applied)
    }
}

/// Deletion order for `root` and its dependents: every dependent comes
/// before the record it depends on. Cycles are cut at the first revisit.
fn cascade_plan<S: RecordStore>(store: &S, root: RecordKey) -> Result<Vec<RecordKey>> {
    if !store.contains(&root.table, root.id)? {
        return Err(StoreError::not_found(&root.table, root.id));
    }

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![(root, false)];

    while let Some((key, expanded)) = stack.pop() {
        if expanded {
            order.push(key);
            continue;
        }
        if !visited.insert(key.clone()) {
            continue;
        }

        let meta = store.meta(&key.table)?;
        let parent = key.id.to_string();
        stack.push((key, true));

        for relation in meta.relations() {
            for child in store.filter(&relation.table, &relation.field, &parent)? {
                let child = RecordKey::new(relation.table.clone(), child.id);
                if !visited.contains(&child) {
                    stack.push((child, false));
                }
            }
        }
    }
    Ok(order)
}

/// `root` and every table reachable from it through relations, breadth first.
fn related_tables<S: RecordStore>(store: &S, root: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::from([root.to_string()]);
    let mut queue = VecDeque::from([root.to_string()]);
    let mut tables = Vec::new();

    while let Some(table) = queue.pop_front() {
        for relation in store.meta(&table)?.relations() {
            if seen.insert(relation.table.clone()) {
                queue.push_back(relation.table.clone());
            }
        }
        tables.push(table);
    }
    Ok(tables)
}
