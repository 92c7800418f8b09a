//! Cursor - a scoped transaction batching store operations.
//!
//! Staging only touches the store to allocate ids and read versions; nothing
//! is written until `commit`. A cursor that is dropped or rolled back leaves
//! no records or index entries behind. Ids it was handed stay consumed, the
//! way a database sequence skips values of aborted transactions.
//!
//! ## Example
//!
//! ```ignore
//! let mut cursor = Cursor::new(store.clone());
//! let id = cursor.stage_put("users", None, fields, indexes)?;
//! cursor.stage_delete("users", old_id)?;
//! assert_eq!(cursor.commit()?, 2);
//! ```

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::error::{Result, StoreError, TransactionError};
use crate::record::{Fields, IndexPair, RecordId, RecordKey};
use crate::store::{Batch, Operation, RecordStore};

/// Lifecycle of a cursor. Only `Open` cursors accept work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Open,
    Committed,
    RolledBack,
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorState::Open => write!(f, "open"),
            CursorState::Committed => write!(f, "committed"),
            CursorState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// One logical transaction against a store.
///
/// Not meant for concurrent staging; give each concurrent caller its own
/// cursor. Commits of cursors touching disjoint records never conflict.
pub struct Cursor<S: RecordStore> {
    store: S,
    batch: Batch,
    /// Whether each touched record exists once the staged operations apply.
    staged: HashMap<RecordKey, bool>,
    state: CursorState,
}

impl<S: RecordStore> Cursor<S> {
    pub fn new(store: S) -> Self {
        Cursor {
            store,
            batch: Batch::new(),
            staged: HashMap::new(),
            state: CursorState::Open,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Number of staged operations.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stage a full overwrite of a record. Allocates an id when none is given.
    ///
    /// `indexes` must agree with `fields` and name only indexed fields; the
    /// stored pairs are always derived from the table schema.
    pub fn stage_put(
        &mut self,
        table: &str,
        id: Option<RecordId>,
        fields: Fields,
        indexes: Vec<IndexPair>,
    ) -> Result<RecordId> {
        self.ensure_open()?;

        let meta = self.store.meta(table)?;
        meta.check_index_pairs(&fields, &indexes)?;
        let indexes = meta.index_pairs(&fields);

        let id = match id {
            Some(id) => {
                self.store.reserve_id(table, id)?;
                id
            }
            None => self.store.allocate_id(table)?,
        };
        let key = RecordKey::new(table, id);
        self.observe(&key)?;

        self.batch.push(Operation::Put {
            table: table.to_string(),
            id,
            fields,
            indexes,
        });
        self.staged.insert(key, true);
        Ok(id)
    }

    /// Stage removal of a record that exists, in the store or in this cursor.
    pub fn stage_delete(&mut self, table: &str, id: RecordId) -> Result<()> {
        self.ensure_open()?;

        let key = RecordKey::new(table, id);
        if !self.observe(&key)? {
            return Err(StoreError::not_found(table, id));
        }

        self.batch.push(Operation::Delete {
            table: table.to_string(),
            id,
        });
        self.staged.insert(key, false);
        Ok(())
    }

    /// Apply every staged operation atomically. Returns the count applied.
    ///
    /// On failure nothing is applied and the cursor is rolled back.
    pub fn commit(&mut self) -> Result<usize> {
        self.ensure_open()?;

        let batch = std::mem::take(&mut self.batch);
        self.staged.clear();
        let staged = batch.len();

        match self.store.apply(batch) {
            Ok(applied) => {
                self.state = CursorState::Committed;
                debug!(applied, "cursor committed");
                Ok(applied)
            }
            Err(err) => {
                self.state = CursorState::RolledBack;
                warn!(staged, error = %err, "cursor rolled back");
                Err(err)
            }
        }
    }

    /// Discard every staged operation. Returns how many were discarded.
    pub fn rollback(&mut self) -> Result<usize> {
        self.ensure_open()?;

        let discarded = std::mem::take(&mut self.batch).len();
        self.staged.clear();
        self.state = CursorState::RolledBack;
        debug!(discarded, "cursor rolled back");
        Ok(discarded)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            CursorState::Open => Ok(()),
            state => Err(TransactionError::Closed { state }.into()),
        }
    }

    /// Existence of `key` as this cursor sees it, recording the store
    /// version on first sight.
    fn observe(&mut self, key: &RecordKey) -> Result<bool> {
        if let Some(exists) = self.staged.get(key) {
            return Ok(*exists);
        }
        let version = self.store.version_of(&key.table, key.id)?;
        self.batch.observe(key.clone(), version);
        Ok(version != 0)
    }
}

impl<S: RecordStore> Drop for Cursor<S> {
    fn drop(&mut self) {
        if self.state == CursorState::Open && !self.batch.is_empty() {
            debug!(discarded = self.batch.len(), "uncommitted cursor dropped");
        }
    }
}
