//! Error types for resource operations.

use std::fmt;
use thiserror::Error;

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Kind of constraint rejected by an integrity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Primary key (or document `_id`, or node id) already taken.
    PrimaryKey,
    /// Unique column, unique index or unique node property.
    Unique,
    /// Foreign key pointing at a missing row.
    ForeignKey,
    /// Relationship endpoint missing, or node still referenced.
    Referential,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrimaryKey => "primary key",
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::Referential => "referential",
        };
        f.write_str(name)
    }
}

/// Errors reported by a resource (driver) to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// A constraint was violated by an operation.
    #[error("{constraint} constraint violated on {target}: {message}")]
    Integrity {
        /// Which kind of constraint rejected the operation.
        constraint: ConstraintKind,
        /// Table, collection, label or relationship type.
        target: String,
        /// Driver-reported description.
        message: String,
    },

    /// Transport or session failure.
    #[error("connectivity error: {message}")]
    Connectivity {
        /// Driver-reported description.
        message: String,
        /// Whether the failure is expected to go away (leader switch, etc).
        transient: bool,
    },

    /// Commit or rollback issued without a transaction.
    #[error("no active transaction")]
    NoActiveTransaction,

    /// Begin issued while a transaction is already open.
    #[error("transaction already active")]
    TransactionAlreadyActive,

    /// The operation names a table the schema does not declare.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// The handle was released or invalidated.
    #[error("handle is closed")]
    Closed,
}

impl ResourceError {
    /// Creates an integrity violation.
    pub fn integrity(
        constraint: ConstraintKind,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Integrity {
            constraint,
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a transient connectivity error.
    pub fn connectivity_transient(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            transient: true,
        }
    }

    /// Creates a non-transient connectivity error.
    pub fn connectivity_fatal(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            transient: false,
        }
    }

    /// Returns true for constraint violations.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }

    /// Returns true for any connectivity error.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Returns true if retrying on a fresh handle may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connectivity {
                transient: true,
                ..
            }
        )
    }

    /// Returns the violated constraint kind, if any.
    #[must_use]
    pub fn constraint(&self) -> Option<ConstraintKind> {
        match self {
            Self::Integrity { constraint, .. } => Some(*constraint),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = ResourceError::integrity(ConstraintKind::PrimaryKey, "person", "dup");
        assert!(err.is_integrity());
        assert!(!err.is_transient());
        assert_eq!(err.constraint(), Some(ConstraintKind::PrimaryKey));

        assert!(ResourceError::connectivity_transient("leader switch").is_transient());
        assert!(!ResourceError::connectivity_fatal("refused").is_transient());
        assert!(ResourceError::connectivity_fatal("refused").is_connectivity());
        assert_eq!(ResourceError::Closed.constraint(), None);
    }

    #[test]
    fn error_display() {
        let err = ResourceError::integrity(
            ConstraintKind::ForeignKey,
            "person_event",
            "person_id=1 has no parent",
        );
        assert_eq!(
            err.to_string(),
            "foreign key constraint violated on person_event: person_id=1 has no parent"
        );
        assert_eq!(ResourceError::NoActiveTransaction.to_string(), "no active transaction");
    }
}
