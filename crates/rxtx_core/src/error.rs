//! Error types for rxtx core.

use crate::transaction::TransactionState;
use rxtx_resource::ResourceError;
use std::time::Duration;
use thiserror::Error;

/// Result type for coordinator operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors that can occur while coordinating a unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// The resource rejected an operation or could not be reached.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// A lifecycle transition not allowed by the state machine.
    #[error("invalid transaction transition from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: TransactionState,
        /// Requested state.
        to: TransactionState,
    },

    /// Work attempted on a transaction that is no longer active.
    #[error("transaction is not active (state: {state})")]
    NotActive {
        /// Current state.
        state: TransactionState,
    },

    /// The unit-of-work function returned an error.
    #[error("unit of work failed: {message}")]
    UnitFailed {
        /// Rendered error of the unit function.
        message: String,
    },

    /// The caller rolled the transaction back on purpose.
    #[error("transaction rolled back on request")]
    RollbackRequested,

    /// The unit of work was cancelled.
    #[error("unit of work cancelled")]
    Cancelled,

    /// The unit of work exceeded its time budget.
    #[error("unit of work timed out after {0:?}")]
    TimedOut(Duration),
}

impl CoordError {
    /// Creates a unit-failed error.
    pub fn unit_failed(message: impl Into<String>) -> Self {
        Self::UnitFailed {
            message: message.into(),
        }
    }

    /// Returns the resource error behind this error, if any.
    #[must_use]
    pub fn resource_error(&self) -> Option<&ResourceError> {
        match self {
            Self::Resource(e) => Some(e),
            _ => None,
        }
    }

    /// Returns true if re-running the unit on a fresh handle may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.resource_error().is_some_and(ResourceError::is_transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_only_for_transient_connectivity() {
        let transient = ResourceError::connectivity_transient("leader switch");
        assert!(CoordError::from(transient).is_transient());
        assert!(!CoordError::from(ResourceError::connectivity_fatal("refused")).is_transient());
        assert!(!CoordError::Cancelled.is_transient());
    }

    #[test]
    fn error_display() {
        let err = CoordError::InvalidTransition {
            from: TransactionState::Committed,
            to: TransactionState::Active,
        };
        assert_eq!(
            err.to_string(),
            "invalid transaction transition from committed to active"
        );
        assert_eq!(CoordError::unit_failed("boom").to_string(), "unit of work failed: boom");
    }
}
