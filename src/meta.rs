//! ModelMeta - run-time schema of one table.
//!
//! Holds the ordered field list, which fields are indexed or required, their
//! defaults, and the relations a cascading delete follows. The model layer
//! uses it to turn loose values into the field map and index pairs the
//! backend stores.
//!
//! ## Example
//!
//! ```ignore
//! let meta = ModelMeta::new("users")
//!     .field(FieldSpec::new("name").indexed().required())
//!     .field(FieldSpec::new("role").default_value("member"))
//!     .related("posts", "author");
//!
//! let prepared = meta.prepare(values)?;
//! backend.add_object(None, prepared.fields, prepared.indexes, true)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{FieldError, Result, StorageError};
use crate::record::{Fields, IndexPair, Record};

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub indexed: bool,
    pub required: bool,
    pub default: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        FieldSpec {
            name: name.into(),
            indexed: false,
            required: false,
            default: None,
        }
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Records of `table` whose `field` holds the parent's id depend on the parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub table: String,
    pub field: String,
}

/// Output of [`ModelMeta::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub fields: Fields,
    pub indexes: Vec<IndexPair>,
}

/// Schema descriptor for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMeta {
    name: String,
    fields: Vec<FieldSpec>,
    related: Vec<Relation>,
}

impl ModelMeta {
    pub fn new(name: impl Into<String>) -> Self {
        ModelMeta {
            name: name.into(),
            fields: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Declare a field. Redeclaring a name replaces it in place.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        match self.fields.iter_mut().find(|f| f.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.fields.push(spec),
        }
        self
    }

    /// Declare that records of `table` referencing this one through `field`
    /// are deleted and flushed with it.
    pub fn related(mut self, table: impl Into<String>, field: impl Into<String>) -> Self {
        self.related.push(Relation {
            table: table.into(),
            field: field.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn relations(&self) -> &[Relation] {
        &self.related
    }

    pub fn is_indexed(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.indexed && f.name == field)
    }

    /// Index pairs for a stored field map, one per indexed field.
    pub fn index_pairs(&self, fields: &Fields) -> Vec<IndexPair> {
        self.fields
            .iter()
            .filter(|f| f.indexed)
            .map(|f| (f.name.clone(), fields.get(&f.name).cloned()))
            .collect()
    }

    /// Check caller-supplied index pairs against the field map they index.
    ///
    /// Every pair must name an indexed field and carry the value the field
    /// map holds for it, unset (`None` or empty) matching an absent value.
    pub fn check_index_pairs(&self, fields: &Fields, pairs: &[IndexPair]) -> Result<()> {
        fn unset(value: Option<&str>) -> Option<&str> {
            value.filter(|v| !v.is_empty())
        }

        for (field, value) in pairs {
            if !self.is_indexed(field) {
                return Err(FieldError::NotIndexed {
                    table: self.name.clone(),
                    field: field.clone(),
                }
                .into());
            }
            if unset(value.as_deref()) != unset(fields.get(field).map(String::as_str)) {
                return Err(FieldError::IndexMismatch {
                    table: self.name.clone(),
                    field: field.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Turn loose values into a storable field map.
    ///
    /// Missing or empty values take the field default. Unknown names and
    /// required fields left without a value are rejected before anything
    /// reaches the store.
    pub fn prepare(&self, mut values: Fields) -> Result<Prepared> {
        let mut fields = Fields::new();
        let mut indexes = Vec::new();

        for spec in &self.fields {
            let value = values
                .remove(&spec.name)
                .filter(|v| !v.is_empty())
                .or_else(|| spec.default.clone());

            if value.is_none() && spec.required {
                return Err(FieldError::Required {
                    table: self.name.clone(),
                    field: spec.name.clone(),
                }
                .into());
            }
            if spec.indexed {
                indexes.push((spec.name.clone(), value.clone()));
            }
            if let Some(value) = value {
                fields.insert(spec.name.clone(), value);
            }
        }

        if let Some(field) = values.into_keys().next() {
            return Err(FieldError::Unknown {
                table: self.name.clone(),
                field,
            }
            .into());
        }

        Ok(Prepared { fields, indexes })
    }

    /// Declared fields of `record` that hold a value.
    pub fn to_dict(&self, record: &Record) -> Fields {
        self.fields
            .iter()
            .filter_map(|spec| {
                record
                    .fields
                    .get(&spec.name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (spec.name.clone(), v.clone()))
            })
            .collect()
    }

    /// Field defaults, for a model that has no instance yet.
    pub fn defaults(&self) -> Fields {
        self.fields
            .iter()
            .filter_map(|spec| {
                spec.default
                    .as_ref()
                    .filter(|v| !v.is_empty())
                    .map(|v| (spec.name.clone(), v.clone()))
            })
            .collect()
    }
}

/// Flatten a serde struct into a field map.
///
/// Strings are taken as-is, other scalars by their JSON text, nested values as
/// JSON documents. `null` leaves the field unset.
pub fn fields_of<T: Serialize>(value: &T) -> Result<Fields> {
    let json = serde_json::to_value(value).map_err(|e| StorageError::Codec(e.to_string()))?;
    let serde_json::Value::Object(map) = json else {
        return Err(StorageError::Codec("expected a struct or map".into()).into());
    };

    let mut fields = Fields::new();
    for (name, value) in map {
        let serialized = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::String(s) => s,
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            other => other.to_string(),
        };
        fields.insert(name, serialized);
    }
    Ok(fields)
}
