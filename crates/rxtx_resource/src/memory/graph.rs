//! Graph constraint set.

use super::{Dataset, Schema};
use crate::error::{ConstraintKind, ResourceError, ResourceResult};
use crate::operation::{Operation, Record, Value};
use crate::resource::ResourceKind;
use std::collections::BTreeMap;

/// Field holding the start node id of a relationship.
pub const FROM: &str = "from";
/// Field holding the end node id of a relationship.
pub const TO: &str = "to";

/// Declaration of a relationship type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDef {
    /// Label of the start node.
    pub from_label: String,
    /// Label of the end node.
    pub to_label: String,
}

/// Nodes are keyed by id within their label; labels appear on first write.
/// Relationship types must be declared and their endpoints must exist.
/// A node that still has relationships cannot be deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSchema {
    unique: BTreeMap<String, Vec<String>>,
    relationships: BTreeMap<String, RelationshipDef>,
}

impl GraphSchema {
    /// Creates a schema without constraints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a uniqueness constraint on `property` of nodes labelled `label`.
    #[must_use]
    pub fn unique(mut self, label: impl Into<String>, property: impl Into<String>) -> Self {
        self.unique
            .entry(label.into())
            .or_default()
            .push(property.into());
        self
    }

    /// Declares a relationship type between two labels.
    #[must_use]
    pub fn relationship(
        mut self,
        rel_type: impl Into<String>,
        from_label: impl Into<String>,
        to_label: impl Into<String>,
    ) -> Self {
        self.relationships.insert(
            rel_type.into(),
            RelationshipDef {
                from_label: from_label.into(),
                to_label: to_label.into(),
            },
        );
        self
    }

    fn check_node(
        &self,
        data: &Dataset,
        label: &str,
        id: &Value,
        node: &Record,
    ) -> ResourceResult<()> {
        let Some(properties) = self.unique.get(label) else {
            return Ok(());
        };
        for property in properties {
            let Some(value) = node.get(property) else {
                continue;
            };
            if let Some(other) = data.find_other(label, property, value, id) {
                return Err(ResourceError::integrity(
                    ConstraintKind::Unique,
                    label,
                    format!(
                        "node {other} already exists with label `{label}` \
                         and property `{property}` = {value}"
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_endpoints(
        &self,
        data: &Dataset,
        rel_type: &str,
        def: &RelationshipDef,
        rel: &Record,
    ) -> ResourceResult<()> {
        for (field, label) in [(FROM, &def.from_label), (TO, &def.to_label)] {
            let endpoint = rel.get(field).unwrap_or(&Value::Null);
            if !data.contains(label, endpoint) {
                return Err(ResourceError::integrity(
                    ConstraintKind::Referential,
                    rel_type,
                    format!("{field} node {endpoint} not found in `{label}`"),
                ));
            }
        }
        Ok(())
    }

    fn check_detached(&self, data: &Dataset, label: &str, id: &Value) -> ResourceResult<()> {
        for (rel_type, def) in &self.relationships {
            let Some(rels) = data.table(rel_type) else {
                continue;
            };
            let attached = rels.values().any(|rel| {
                (def.from_label == label && rel.get(FROM) == Some(id))
                    || (def.to_label == label && rel.get(TO) == Some(id))
            });
            if attached {
                return Err(ResourceError::integrity(
                    ConstraintKind::Referential,
                    label,
                    format!("node {id} still has `{rel_type}` relationships, delete them first"),
                ));
            }
        }
        Ok(())
    }
}

impl Schema for GraphSchema {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Graph
    }

    fn check(&self, data: &Dataset, operation: &Operation) -> ResourceResult<()> {
        let target = operation.target();
        let rel_def = self.relationships.get(target);

        match operation {
            Operation::Insert { key, fields, .. } => {
                if data.contains(target, key) {
                    return Err(ResourceError::integrity(
                        ConstraintKind::PrimaryKey,
                        target,
                        format!("id {key} already exists"),
                    ));
                }
                match rel_def {
                    Some(def) => self.check_endpoints(data, target, def, fields),
                    None => self.check_node(data, target, key, fields),
                }
            }
            Operation::Update { key, fields, .. } => {
                let Some(existing) = data.get(target, key) else {
                    return Ok(());
                };
                let mut merged = existing.clone();
                merged.extend(fields.clone());
                match rel_def {
                    Some(def) => self.check_endpoints(data, target, def, &merged),
                    None => self.check_node(data, target, key, &merged),
                }
            }
            Operation::Delete { key, .. } => match rel_def {
                Some(_) => Ok(()),
                None => self.check_detached(data, target, key),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> GraphSchema {
        GraphSchema::new()
            .unique("Person", "name")
            .relationship("ACTED_IN", "Person", "Movie")
    }

    fn seeded() -> Dataset {
        let mut data = Dataset::new();
        data.apply(&Operation::insert("Person", 1).with("name", "Linda Hamilton"));
        data.apply(&Operation::insert("Movie", 10).with("title", "The Terminator"));
        data
    }

    #[test]
    fn unique_property_enforced() {
        let err = schema()
            .check(&seeded(), &Operation::insert("Person", 2).with("name", "Linda Hamilton"))
            .unwrap_err();
        assert_eq!(err.constraint(), Some(ConstraintKind::Unique));
    }

    #[test]
    fn relationship_needs_both_endpoints() {
        let data = seeded();
        let ok = Operation::insert("ACTED_IN", 100).with(FROM, 1).with(TO, 10);
        assert!(schema().check(&data, &ok).is_ok());

        let dangling = Operation::insert("ACTED_IN", 101).with(FROM, 1).with(TO, 11);
        assert_eq!(
            schema().check(&data, &dangling).unwrap_err().constraint(),
            Some(ConstraintKind::Referential)
        );
    }

    #[test]
    fn attached_node_cannot_be_deleted() {
        let mut data = seeded();
        data.apply(&Operation::insert("ACTED_IN", 100).with(FROM, 1).with(TO, 10));

        let err = schema()
            .check(&data, &Operation::delete("Movie", 10))
            .unwrap_err();
        assert_eq!(err.constraint(), Some(ConstraintKind::Referential));

        data.apply(&Operation::delete("ACTED_IN", 100));
        assert!(schema().check(&data, &Operation::delete("Movie", 10)).is_ok());
    }
}
