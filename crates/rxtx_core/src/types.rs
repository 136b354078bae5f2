//! Core type definitions for rxtx.

use std::fmt;

/// Identifier of a unit of work.
///
/// Unit IDs are monotonically increasing per coordinator and only serve to
/// correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);

impl UnitId {
    /// Creates a new unit ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit:{}", self.0)
    }
}

/// How a unit of work is demarcated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionMode {
    /// Every operation is committed on its own by the resource.
    AutoCommit,
    /// The caller drives begin, commit and rollback.
    #[default]
    Explicit,
    /// A function boundary is wrapped; its result decides commit or rollback.
    Declarative,
}

impl TransactionMode {
    /// Returns true for the modes that give all-or-nothing visibility.
    #[must_use]
    pub const fn is_atomic(self) -> bool {
        !matches!(self, Self::AutoCommit)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AutoCommit => "auto-commit",
            Self::Explicit => "explicit",
            Self::Declarative => "declarative",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_id_display() {
        assert_eq!(UnitId::new(7).to_string(), "unit:7");
        assert_eq!(UnitId::new(7).as_u64(), 7);
    }

    #[test]
    fn atomic_modes() {
        assert!(!TransactionMode::AutoCommit.is_atomic());
        assert!(TransactionMode::Explicit.is_atomic());
        assert!(TransactionMode::Declarative.is_atomic());
        assert_eq!(TransactionMode::default(), TransactionMode::Explicit);
    }
}
