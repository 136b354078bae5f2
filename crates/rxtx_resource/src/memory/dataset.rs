//! Committed and working state of an in-memory store.

use crate::operation::{Operation, OperationResult, Record, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// Records of one table, collection, label or relationship type, by key.
pub type Table = BTreeMap<Value, Record>;

/// All records of a store, grouped by target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dataset {
    targets: BTreeMap<String, Table>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record stored under `key`.
    #[must_use]
    pub fn get(&self, target: &str, key: &Value) -> Option<&Record> {
        self.targets.get(target).and_then(|table| table.get(key))
    }

    /// Returns true if a record exists under `key`.
    #[must_use]
    pub fn contains(&self, target: &str, key: &Value) -> bool {
        self.get(target, key).is_some()
    }

    /// Returns all records of a target.
    #[must_use]
    pub fn table(&self, target: &str) -> Option<&Table> {
        self.targets.get(target)
    }

    /// Returns the number of records in a target.
    #[must_use]
    pub fn count(&self, target: &str) -> usize {
        self.targets.get(target).map_or(0, BTreeMap::len)
    }

    /// Returns the total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.targets.values().map(BTreeMap::len).sum()
    }

    /// Iterates targets in name order.
    pub fn targets(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.targets.iter().map(|(name, table)| (name.as_str(), table))
    }

    /// Finds a record other than `except` whose `field` equals `value`.
    #[must_use]
    pub fn find_other(
        &self,
        target: &str,
        field: &str,
        value: &Value,
        except: &Value,
    ) -> Option<&Value> {
        self.targets.get(target)?.iter().find_map(|(key, record)| {
            (key != except && record.get(field) == Some(value)).then_some(key)
        })
    }

    /// Creates an empty target if it does not exist.
    pub(crate) fn ensure_target(&mut self, target: &str) {
        self.targets.entry(target.to_owned()).or_default();
    }

    /// Applies an already validated operation.
    pub(crate) fn apply(&mut self, operation: &Operation) -> OperationResult {
        match operation {
            Operation::Insert {
                target,
                key,
                fields,
            } => {
                self.targets
                    .entry(target.clone())
                    .or_default()
                    .insert(key.clone(), fields.clone());
                OperationResult::new(1)
            }
            Operation::Update {
                target,
                key,
                fields,
            } => match self.targets.get_mut(target).and_then(|t| t.get_mut(key)) {
                Some(record) => {
                    record.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                    OperationResult::new(1)
                }
                None => OperationResult::new(0),
            },
            Operation::Delete { target, key } => {
                let removed = self
                    .targets
                    .get_mut(target)
                    .and_then(|t| t.remove(key))
                    .is_some();
                OperationResult::new(u64::from(removed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_insert_update_delete() {
        let mut data = Dataset::new();

        let r = data.apply(&Operation::insert("person", 1).with("first_name", "Jesse"));
        assert_eq!(r.affected, 1);
        assert_eq!(data.count("person"), 1);

        let r = data.apply(&Operation::update("person", 1).with("last_name", "Pinkman"));
        assert_eq!(r.affected, 1);
        let record = data.get("person", &Value::Int(1)).unwrap();
        assert_eq!(record.len(), 2);

        let r = data.apply(&Operation::delete("person", 1));
        assert_eq!(r.affected, 1);
        assert!(!data.contains("person", &Value::Int(1)));
    }

    #[test]
    fn missing_rows_affect_nothing() {
        let mut data = Dataset::new();
        assert_eq!(data.apply(&Operation::update("person", 7)).affected, 0);
        assert_eq!(data.apply(&Operation::delete("person", 7)).affected, 0);
        assert_eq!(data.total(), 0);
    }

    #[test]
    fn find_other_skips_own_key() {
        let mut data = Dataset::new();
        data.apply(&Operation::insert("person", 1).with("email", "jesse@example.com"));

        let email = Value::from("jesse@example.com");
        assert!(data.find_other("person", "email", &email, &Value::Int(1)).is_none());
        assert_eq!(
            data.find_other("person", "email", &email, &Value::Int(2)),
            Some(&Value::Int(1))
        );
    }
}
