//! Result classification of a unit of work.

use crate::error::{CoordError, CoordResult};
use crate::transaction::{Interrupt, Lifecycle};
use rxtx_resource::ResourceError;
use std::fmt;
use std::time::Duration;

/// Why a transaction ended in rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReason {
    /// The operation at `index` was rejected by the resource.
    OperationFailed {
        /// Zero-based position of the operation in the unit.
        index: usize,
        /// Error reported by the resource.
        error: ResourceError,
    },
    /// The unit-of-work function returned an error.
    UnitFailed(String),
    /// The transaction was marked rollback-only.
    RollbackOnly,
    /// The caller asked for rollback.
    Requested,
    /// Cancellation was signalled while the unit was running.
    Cancelled,
    /// The unit exceeded its time budget.
    TimedOut(Duration),
    /// The resource refused to commit.
    CommitFailed(ResourceError),
}

impl RollbackReason {
    /// Returns the resource error behind this rollback, if any.
    #[must_use]
    pub fn resource_error(&self) -> Option<&ResourceError> {
        match self {
            Self::OperationFailed { error, .. } | Self::CommitFailed(error) => Some(error),
            _ => None,
        }
    }

    /// Converts the reason into the equivalent error.
    #[must_use]
    pub fn into_error(self) -> CoordError {
        match self {
            Self::OperationFailed { error, .. } | Self::CommitFailed(error) => {
                CoordError::Resource(error)
            }
            Self::UnitFailed(message) => CoordError::UnitFailed { message },
            Self::RollbackOnly | Self::Requested => CoordError::RollbackRequested,
            Self::Cancelled => CoordError::Cancelled,
            Self::TimedOut(limit) => CoordError::TimedOut(limit),
        }
    }
}

impl fmt::Display for RollbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperationFailed { index, error } => {
                write!(f, "operation {index} failed: {error}")
            }
            Self::UnitFailed(message) => write!(f, "unit failed: {message}"),
            Self::RollbackOnly => f.write_str("marked rollback-only"),
            Self::Requested => f.write_str("rollback requested"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::TimedOut(limit) => write!(f, "timed out after {limit:?}"),
            Self::CommitFailed(error) => write!(f, "commit failed: {error}"),
        }
    }
}

/// Coarse classification of an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    /// All changes applied.
    Committed,
    /// All changes discarded.
    RolledBack,
    /// The unit could not complete cleanly.
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final result of a unit of work.
///
/// Every variant other than `Committed` carries the reason it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T = ()> {
    /// The unit completed and its changes are visible.
    Committed(T),
    /// The unit was undone.
    RolledBack(RollbackReason),
    /// The unit failed without a clean rollback.
    ///
    /// In auto-commit mode, operations before `operation` stay committed.
    Failed {
        /// Index of the failing operation, when one is to blame.
        operation: Option<usize>,
        /// The error.
        error: CoordError,
    },
}

impl<T> Outcome<T> {
    /// Creates a failure not attributed to any operation.
    pub fn failed(error: impl Into<CoordError>) -> Self {
        Self::Failed {
            operation: None,
            error: error.into(),
        }
    }

    /// Classifies an error raised before the transaction began.
    ///
    /// Interruptions still read as rollbacks so that a cancelled atomic unit
    /// never reports anything else.
    pub(crate) fn not_started(error: CoordError) -> Self {
        match error {
            CoordError::Cancelled => Self::RolledBack(RollbackReason::Cancelled),
            CoordError::TimedOut(limit) => Self::RolledBack(RollbackReason::TimedOut(limit)),
            error => Self::failed(error),
        }
    }

    /// Returns the classification.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Committed(_) => OutcomeKind::Committed,
            Self::RolledBack(_) => OutcomeKind::RolledBack,
            Self::Failed { .. } => OutcomeKind::Failed,
        }
    }

    /// Returns true if the unit committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// Returns true if the unit rolled back.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Self::RolledBack(_))
    }

    /// Returns true if the unit failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns true for a failure caused by a transient connectivity error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Failed { error, .. } if error.is_transient())
    }

    /// Returns the resource error that caused this outcome, if any.
    #[must_use]
    pub fn resource_error(&self) -> Option<&ResourceError> {
        match self {
            Self::Committed(_) => None,
            Self::RolledBack(reason) => reason.resource_error(),
            Self::Failed { error, .. } => error.resource_error(),
        }
    }

    /// Returns the committed value.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Committed(value) => Some(value),
            _ => None,
        }
    }

    /// Maps the committed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Committed(value) => Outcome::Committed(f(value)),
            Self::RolledBack(reason) => Outcome::RolledBack(reason),
            Self::Failed { operation, error } => Outcome::Failed { operation, error },
        }
    }

    /// Converts into a `Result`, turning rollbacks into their error.
    pub fn into_result(self) -> CoordResult<T> {
        match self {
            Self::Committed(value) => Ok(value),
            Self::RolledBack(reason) => Err(reason.into_error()),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed(_) => f.write_str("committed"),
            Self::RolledBack(reason) => write!(f, "rolled back ({reason})"),
            Self::Failed {
                operation: Some(index),
                error,
            } => write!(f, "failed at operation {index} ({error})"),
            Self::Failed {
                operation: None,
                error,
            } => write!(f, "failed ({error})"),
        }
    }
}

/// How a transaction must end once its unit of work has returned.
#[derive(Debug)]
pub(crate) enum Resolution<T> {
    Commit(T),
    Rollback(RollbackReason),
    /// Roll back, then report failure.
    Abort {
        operation: Option<usize>,
        error: CoordError,
    },
}

impl<T> Resolution<T> {
    /// Decides the ending from the lifecycle and the unit's own result.
    ///
    /// Interruption beats operation failure, which beats the unit's error,
    /// which beats the rollback-only flag.
    pub(crate) fn decide(lifecycle: &Lifecycle, result: Result<T, String>) -> Self {
        if let Some(interrupt) = lifecycle.interrupt() {
            return Self::Rollback(match interrupt {
                Interrupt::Cancelled => RollbackReason::Cancelled,
                Interrupt::TimedOut(limit) => RollbackReason::TimedOut(limit),
            });
        }
        if let Some((index, error)) = lifecycle.failure() {
            if error.is_connectivity() {
                return Self::Abort {
                    operation: Some(*index),
                    error: CoordError::Resource(error.clone()),
                };
            }
            return Self::Rollback(RollbackReason::OperationFailed {
                index: *index,
                error: error.clone(),
            });
        }
        match result {
            Err(message) => Self::Rollback(RollbackReason::UnitFailed(message)),
            Ok(_) if lifecycle.is_rollback_only() => Self::Rollback(RollbackReason::RollbackOnly),
            Ok(value) => Self::Commit(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TransactionMode, UnitId};
    use rxtx_resource::ConstraintKind;

    fn active() -> Lifecycle {
        let mut lc = Lifecycle::new(UnitId::new(1), TransactionMode::Declarative);
        lc.begin().unwrap();
        lc
    }

    fn pk_error() -> ResourceError {
        ResourceError::integrity(ConstraintKind::PrimaryKey, "person", "duplicate")
    }

    #[test]
    fn clean_unit_commits() {
        assert!(matches!(Resolution::decide(&active(), Ok(5)), Resolution::Commit(5)));
    }

    #[test]
    fn swallowed_operation_error_still_rolls_back() {
        let mut lc = active();
        lc.record_failure(1, pk_error());
        match Resolution::decide(&lc, Ok(())) {
            Resolution::Rollback(RollbackReason::OperationFailed { index, error }) => {
                assert_eq!(index, 1);
                assert!(error.is_integrity());
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn connectivity_error_aborts() {
        let mut lc = active();
        lc.record_failure(0, ResourceError::connectivity_fatal("reset"));
        assert!(matches!(
            Resolution::<()>::decide(&lc, Err("reset".into())),
            Resolution::Abort { operation: Some(0), .. }
        ));
    }

    #[test]
    fn interrupt_wins() {
        let mut lc = active();
        lc.record_failure(0, pk_error());
        lc.record_interrupt(Interrupt::Cancelled);
        assert!(matches!(
            Resolution::decide(&lc, Ok(())),
            Resolution::Rollback(RollbackReason::Cancelled)
        ));
    }

    #[test]
    fn rollback_only_and_unit_error() {
        let mut lc = active();
        lc.set_rollback_only();
        assert!(matches!(
            Resolution::decide(&lc, Ok(())),
            Resolution::Rollback(RollbackReason::RollbackOnly)
        ));
        assert!(matches!(
            Resolution::<()>::decide(&lc, Err("boom".into())),
            Resolution::Rollback(RollbackReason::UnitFailed(_))
        ));
    }

    #[test]
    fn outcome_accessors() {
        let committed: Outcome<u32> = Outcome::Committed(3);
        assert_eq!(committed.kind(), OutcomeKind::Committed);
        assert_eq!(committed.value(), Some(&3));
        assert_eq!(committed.clone().map(|v| v * 2), Outcome::Committed(6));
        assert_eq!(committed.into_result(), Ok(3));

        let rolled: Outcome = Outcome::RolledBack(RollbackReason::OperationFailed {
            index: 3,
            error: pk_error(),
        });
        assert!(rolled.is_rolled_back());
        assert_eq!(rolled.resource_error(), Some(&pk_error()));
        assert_eq!(rolled.into_result(), Err(CoordError::Resource(pk_error())));

        let failed: Outcome = Outcome::Failed {
            operation: Some(2),
            error: ResourceError::connectivity_transient("leader changed").into(),
        };
        assert!(failed.is_failed());
        assert!(failed.is_transient());
        assert!(failed.to_string().starts_with("failed at operation 2"));
    }
}
