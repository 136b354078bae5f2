//! Statement model shared by every backend kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar field value.
///
/// Values are totally ordered so they can serve as keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Returns true for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Field name → value.
pub type Record = BTreeMap<String, Value>;

/// A single statement applied to a resource.
///
/// `target` names a table, a document collection, a node label or a
/// relationship type depending on the backend kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a record under `key`.
    Insert {
        /// Table, collection, label or relationship type.
        target: String,
        /// Primary key, `_id` or node id.
        key: Value,
        /// Non-key fields.
        fields: Record,
    },
    /// Merge `fields` into the record under `key`.
    Update {
        /// Table, collection, label or relationship type.
        target: String,
        /// Primary key, `_id` or node id.
        key: Value,
        /// Fields to overwrite.
        fields: Record,
    },
    /// Remove the record under `key`.
    Delete {
        /// Table, collection, label or relationship type.
        target: String,
        /// Primary key, `_id` or node id.
        key: Value,
    },
}

impl Operation {
    /// Starts an insert with no fields.
    pub fn insert(target: impl Into<String>, key: impl Into<Value>) -> Self {
        Self::Insert {
            target: target.into(),
            key: key.into(),
            fields: Record::new(),
        }
    }

    /// Starts an update with no fields.
    pub fn update(target: impl Into<String>, key: impl Into<Value>) -> Self {
        Self::Update {
            target: target.into(),
            key: key.into(),
            fields: Record::new(),
        }
    }

    /// Creates a delete.
    pub fn delete(target: impl Into<String>, key: impl Into<Value>) -> Self {
        Self::Delete {
            target: target.into(),
            key: key.into(),
        }
    }

    /// Adds a field. Has no effect on deletes.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Self::Insert { fields, .. } | Self::Update { fields, .. } = &mut self {
            fields.insert(name.into(), value.into());
        }
        self
    }

    /// Returns the target name.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Insert { target, .. }
            | Self::Update { target, .. }
            | Self::Delete { target, .. } => target,
        }
    }

    /// Returns the record key.
    #[must_use]
    pub fn key(&self) -> &Value {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    /// Returns the written fields (empty for deletes).
    #[must_use]
    pub fn fields(&self) -> Option<&Record> {
        match self {
            Self::Insert { fields, .. } | Self::Update { fields, .. } => Some(fields),
            Self::Delete { .. } => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Insert { .. } => "INSERT",
            Self::Update { .. } => "UPDATE",
            Self::Delete { .. } => "DELETE",
        };
        write!(f, "{verb} {}[{}]", self.target(), self.key())
    }
}

/// Result of a successfully executed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationResult {
    /// Number of records changed.
    pub affected: u64,
}

impl OperationResult {
    /// Creates a result.
    #[must_use]
    pub const fn new(affected: u64) -> Self {
        Self { affected }
    }
}
