//! Secondary equality indexes: `(field, value) -> ids`.
//!
//! One `IndexManager` per table. Its contents are a pure function of the
//! table's records, so `rebuild` can always restore it.

use std::collections::{BTreeSet, HashMap};

use crate::record::{IndexPair, RecordId};

/// Equality index over the indexed fields of one table.
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    entries: HashMap<String, HashMap<String, BTreeSet<RecordId>>>,
}

/// Drop unset values and duplicates.
fn normalize(pairs: &[IndexPair]) -> BTreeSet<(&str, &str)> {
    pairs
        .iter()
        .filter_map(|(field, value)| match value.as_deref() {
            Some(value) if !value.is_empty() => Some((field.as_str(), value)),
            _ => None,
        })
        .collect()
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `id` from the entries of `old` to the entries of `new`.
    ///
    /// Only the symmetric difference is touched; pairs present in both stay.
    pub fn update(&mut self, id: RecordId, old: &[IndexPair], new: &[IndexPair]) {
        let old = normalize(old);
        let new = normalize(new);

        for (field, value) in old.difference(&new) {
            self.remove(id, field, value);
        }
        for (field, value) in new.difference(&old) {
            self.insert(id, field, value);
        }
    }

    /// Ids whose `field` currently holds `value`.
    pub fn lookup(&self, field: &str, value: &str) -> BTreeSet<RecordId> {
        self.entries
            .get(field)
            .and_then(|values| values.get(value))
            .cloned()
            .unwrap_or_default()
    }

    /// Recompute every entry from the given records.
    pub fn rebuild<'a, I>(&mut self, records: I)
    where
        I: IntoIterator<Item = (RecordId, &'a [IndexPair])>,
    {
        self.entries.clear();
        for (id, pairs) in records {
            self.update(id, &[], pairs);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct `(field, value)` entries.
    pub fn entry_count(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, id: RecordId, field: &str, value: &str) {
        self.entries
            .entry(field.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default()
            .insert(id);
    }

    fn remove(&mut self, id: RecordId, field: &str, value: &str) {
        let Some(values) = self.entries.get_mut(field) else {
            return;
        };
        if let Some(ids) = values.get_mut(value) {
            ids.remove(&id);
            if ids.is_empty() {
                values.remove(value);
            }
        }
        if values.is_empty() {
            self.entries.remove(field);
        }
    }
}

impl PartialEq for IndexManager {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for IndexManager {}
