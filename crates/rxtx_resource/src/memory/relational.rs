//! Relational constraint set.

use super::{Dataset, Schema};
use crate::error::{ConstraintKind, ResourceError, ResourceResult};
use crate::operation::{Operation, Record, Value};
use crate::resource::ResourceKind;
use std::collections::BTreeMap;

/// A foreign key from a column to the primary key of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub references: String,
}

/// Declaration of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    unique: Vec<String>,
    foreign_keys: Vec<ForeignKey>,
}

impl TableDef {
    /// Declares a table with only a primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a unique column.
    #[must_use]
    pub fn unique(mut self, column: impl Into<String>) -> Self {
        self.unique.push(column.into());
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, column: impl Into<String>, references: impl Into<String>) -> Self {
        self.foreign_keys.push(ForeignKey {
            column: column.into(),
            references: references.into(),
        });
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the foreign keys.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    fn check_row(&self, data: &Dataset, key: &Value, row: &Record) -> ResourceResult<()> {
        for column in &self.unique {
            let Some(value) = row.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(other) = data.find_other(&self.name, column, value, key) {
                return Err(ResourceError::integrity(
                    ConstraintKind::Unique,
                    &self.name,
                    format!("{column}={value} already used by row {other}"),
                ));
            }
        }

        for fk in &self.foreign_keys {
            let Some(value) = row.get(&fk.column).filter(|v| !v.is_null()) else {
                continue;
            };
            if !data.contains(&fk.references, value) {
                return Err(ResourceError::integrity(
                    ConstraintKind::ForeignKey,
                    &self.name,
                    format!(
                        "{}={value} references missing {} row",
                        fk.column, fk.references
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Declared tables of a relational store.
///
/// Foreign keys are checked when the referencing row is written. Deleting a
/// referenced row is not restricted; a later write pointing at it fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationalSchema {
    tables: BTreeMap<String, TableDef>,
}

impl RelationalSchema {
    /// Creates a schema without tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table.
    #[must_use]
    pub fn with_table(mut self, table: TableDef) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Returns a table declaration.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }
}

impl Schema for RelationalSchema {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Relational
    }

    fn initial(&self) -> Dataset {
        let mut data = Dataset::new();
        for name in self.tables.keys() {
            data.ensure_target(name);
        }
        data
    }

    fn check(&self, data: &Dataset, operation: &Operation) -> ResourceResult<()> {
        let table = self
            .tables
            .get(operation.target())
            .ok_or_else(|| ResourceError::UnknownTarget(operation.target().to_owned()))?;

        match operation {
            Operation::Insert { key, fields, .. } => {
                if data.contains(&table.name, key) {
                    return Err(ResourceError::integrity(
                        ConstraintKind::PrimaryKey,
                        &table.name,
                        format!("duplicate primary key {key}"),
                    ));
                }
                table.check_row(data, key, fields)
            }
            Operation::Update { key, fields, .. } => match data.get(&table.name, key) {
                Some(existing) => {
                    let mut merged = existing.clone();
                    merged.extend(fields.clone());
                    table.check_row(data, key, &merged)
                }
                None => Ok(()),
            },
            Operation::Delete { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RelationalSchema {
        RelationalSchema::new()
            .with_table(TableDef::new("person").unique("email"))
            .with_table(TableDef::new("person_event").foreign_key("person_id", "person"))
    }

    fn seeded() -> Dataset {
        let mut data = schema().initial();
        data.apply(&Operation::insert("person", 1).with("email", "jesse@example.com"));
        data
    }

    #[test]
    fn initial_declares_tables() {
        let data = schema().initial();
        assert!(data.table("person").is_some());
        assert!(data.table("person_event").is_some());
    }

    #[test]
    fn unknown_table_rejected() {
        let err = schema()
            .check(&Dataset::new(), &Operation::insert("car", 1))
            .unwrap_err();
        assert_eq!(err, ResourceError::UnknownTarget("car".into()));
    }

    #[test]
    fn duplicate_primary_key_rejected() {
        let err = schema()
            .check(&seeded(), &Operation::insert("person", 1))
            .unwrap_err();
        assert_eq!(err.constraint(), Some(ConstraintKind::PrimaryKey));
    }

    #[test]
    fn unique_column_rejected_on_insert_and_update() {
        let mut data = seeded();
        let insert = Operation::insert("person", 2).with("email", "jesse@example.com");
        assert_eq!(
            schema().check(&data, &insert).unwrap_err().constraint(),
            Some(ConstraintKind::Unique)
        );

        data.apply(&Operation::insert("person", 2).with("email", "walter@example.com"));
        let update = Operation::update("person", 2).with("email", "jesse@example.com");
        assert_eq!(
            schema().check(&data, &update).unwrap_err().constraint(),
            Some(ConstraintKind::Unique)
        );

        let own = Operation::update("person", 1).with("email", "jesse@example.com");
        assert!(schema().check(&data, &own).is_ok());
    }

    #[test]
    fn foreign_key_checked_on_write_only() {
        let mut data = seeded();
        let event = Operation::insert("person_event", 1).with("person_id", 1);
        assert!(schema().check(&data, &event).is_ok());
        data.apply(&event);

        assert!(schema().check(&data, &Operation::delete("person", 1)).is_ok());
        data.apply(&Operation::delete("person", 1));

        let dangling = Operation::insert("person_event", 2).with("person_id", 1);
        assert_eq!(
            schema().check(&data, &dangling).unwrap_err().constraint(),
            Some(ConstraintKind::ForeignKey)
        );
    }

    #[test]
    fn null_foreign_key_allowed() {
        let event = Operation::insert("person_event", 1).with("person_id", Value::Null);
        assert!(schema().check(&schema().initial(), &event).is_ok());
    }
}
