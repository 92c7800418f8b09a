//! Store snapshots: the full contents of an in-memory store as bytes.
//!
//! Indexes are not part of the image; `load` rebuilds them from records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::in_memory::{StoreState, StoredRecord, Table};
use super::InMemoryRecordStore;
use crate::config::StoreConfig;
use crate::error::{Result, StorageError};
use crate::meta::ModelMeta;
use crate::record::{Fields, IndexPair, RecordId};

#[derive(Serialize, Deserialize)]
struct StoreImage {
    sequence: u64,
    tables: Vec<TableImage>,
}

#[derive(Serialize, Deserialize)]
struct TableImage {
    meta: ModelMeta,
    next_id: u64,
    records: Vec<RecordImage>,
}

#[derive(Serialize, Deserialize)]
struct RecordImage {
    id: RecordId,
    fields: Fields,
    indexes: Vec<IndexPair>,
    version: u64,
}

impl InMemoryRecordStore {
    /// Encode every table, record and id counter.
    pub fn dump(&self) -> Result<Vec<u8>> {
        let state = self.read("dump")?;
        let mut tables: Vec<TableImage> = state
            .tables
            .values()
            .map(|table| TableImage {
                meta: table.meta.clone(),
                next_id: table.next_id,
                records: table
                    .records
                    .iter()
                    .map(|(id, stored)| RecordImage {
                        id: *id,
                        fields: stored.fields.clone(),
                        indexes: stored.indexes.clone(),
                        version: stored.version,
                    })
                    .collect(),
            })
            .collect();
        tables.sort_by(|a, b| a.meta.name().cmp(b.meta.name()));

        let image = StoreImage {
            sequence: state.sequence,
            tables,
        };
        let bytes = bitcode::serialize(&image).map_err(|e| StorageError::Codec(e.to_string()))?;
        Ok(bytes)
    }

    /// Rebuild a store, and all of its indexes, from `dump` output.
    pub fn load(bytes: &[u8], config: StoreConfig) -> Result<Self> {
        let image: StoreImage =
            bitcode::deserialize(bytes).map_err(|e| StorageError::Codec(e.to_string()))?;

        let mut state = StoreState {
            tables: Default::default(),
            sequence: image.sequence,
        };
        for table_image in image.tables {
            let name = table_image.meta.name().to_string();
            let mut table = Table::new(table_image.meta);
            table.next_id = table_image.next_id;
            table.records = table_image
                .records
                .into_iter()
                .map(|r| {
                    (
                        r.id,
                        StoredRecord {
                            fields: r.fields,
                            indexes: r.indexes,
                            version: r.version,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>();
            table.reindex();
            debug!(table = %name, records = table.records.len(), "table loaded");
            state.tables.insert(name, table);
        }

        Ok(Self::from_state(state, config))
    }
}
