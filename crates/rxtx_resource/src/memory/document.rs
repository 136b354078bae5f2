//! Document constraint set.

use super::{Dataset, Schema};
use crate::error::{ConstraintKind, ResourceError, ResourceResult};
use crate::operation::{Operation, Record, Value};
use crate::resource::ResourceKind;
use std::collections::BTreeMap;

/// Collections are created on first write. Every collection has a unique
/// `_id`; additional unique indexes are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSchema {
    unique_indexes: BTreeMap<String, Vec<String>>,
}

impl DocumentSchema {
    /// Creates a schema with only `_id` indexes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unique index on `field` of `collection`.
    #[must_use]
    pub fn unique_index(mut self, collection: impl Into<String>, field: impl Into<String>) -> Self {
        self.unique_indexes
            .entry(collection.into())
            .or_default()
            .push(field.into());
        self
    }

    fn check_indexes(
        &self,
        data: &Dataset,
        collection: &str,
        id: &Value,
        document: &Record,
    ) -> ResourceResult<()> {
        let Some(fields) = self.unique_indexes.get(collection) else {
            return Ok(());
        };
        for field in fields {
            let Some(value) = document.get(field) else {
                continue;
            };
            if data.find_other(collection, field, value, id).is_some() {
                return Err(ResourceError::integrity(
                    ConstraintKind::Unique,
                    collection,
                    format!("duplicate key error index: {field}_1 dup key: {{ {field}: {value} }}"),
                ));
            }
        }
        Ok(())
    }
}

impl Schema for DocumentSchema {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Document
    }

    fn check(&self, data: &Dataset, operation: &Operation) -> ResourceResult<()> {
        let collection = operation.target();
        match operation {
            Operation::Insert { key, fields, .. } => {
                if data.contains(collection, key) {
                    return Err(ResourceError::integrity(
                        ConstraintKind::PrimaryKey,
                        collection,
                        format!("duplicate key error index: _id_ dup key: {{ _id: {key} }}"),
                    ));
                }
                self.check_indexes(data, collection, key, fields)
            }
            Operation::Update { key, fields, .. } => match data.get(collection, key) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    merged.extend(fields.clone());
                    self.check_indexes(data, collection, key, &merged)
                }
                None => Ok(()),
            },
            Operation::Delete { .. } => Ok(()),
        }
    }
}
