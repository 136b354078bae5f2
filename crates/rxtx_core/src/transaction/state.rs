//! Transaction lifecycle.

use crate::error::{CoordError, CoordResult};
use crate::types::{TransactionMode, UnitId};
use rxtx_resource::ResourceError;
use std::fmt;
use std::time::Duration;

/// State of a transaction.
///
/// ```text
/// Idle -> Active -> Committing -> Committed
///           |           |
///           v           v
///       RollingBack -> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Handle acquired, transaction not yet started.
    Idle,
    /// Transaction started; operations may be executed.
    Active,
    /// Commit requested, awaiting the resource.
    Committing,
    /// Changes durably applied.
    Committed,
    /// Rollback requested, awaiting the resource.
    RollingBack,
    /// Changes discarded.
    RolledBack,
}

impl TransactionState {
    /// Returns true for `Committed` and `RolledBack`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Checks whether moving from `self` to `to` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Active)
                | (Self::Active, Self::Committing)
                | (Self::Active, Self::RollingBack)
                | (Self::Committing, Self::Committed)
                | (Self::Committing, Self::RollingBack)
                | (Self::RollingBack, Self::RolledBack)
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RollingBack => "rolling back",
            Self::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

/// Why a unit of work was interrupted from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

impl Interrupt {
    pub(crate) fn into_error(self) -> CoordError {
        match self {
            Self::Cancelled => CoordError::Cancelled,
            Self::TimedOut(limit) => CoordError::TimedOut(limit),
        }
    }
}

/// Bookkeeping for one transaction.
///
/// Tracks the lifecycle state, the rollback-only flag, the number of
/// operations executed and the first failure observed.
#[derive(Debug)]
pub struct Lifecycle {
    unit: UnitId,
    mode: TransactionMode,
    state: TransactionState,
    rollback_only: bool,
    attempted: usize,
    executed: usize,
    failure: Option<(usize, ResourceError)>,
    interrupt: Option<Interrupt>,
}

impl Lifecycle {
    pub(crate) fn new(unit: UnitId, mode: TransactionMode) -> Self {
        Self {
            unit,
            mode,
            state: TransactionState::Idle,
            rollback_only: false,
            attempted: 0,
            executed: 0,
            failure: None,
            interrupt: None,
        }
    }

    /// Returns the unit this transaction belongs to.
    #[must_use]
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Returns the demarcation mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Returns whether the transaction can only end in rollback.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Number of operations that completed successfully.
    #[must_use]
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// First operation failure as `(index, error)`.
    #[must_use]
    pub fn failure(&self) -> Option<&(usize, ResourceError)> {
        self.failure.as_ref()
    }

    /// Marks the transaction rollback-only. Cannot be undone.
    pub fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub(crate) fn interrupt(&self) -> Option<Interrupt> {
        self.interrupt
    }

    pub(crate) fn begin(&mut self) -> CoordResult<()> {
        self.transition(TransactionState::Active)
    }

    pub(crate) fn start_commit(&mut self) -> CoordResult<()> {
        self.transition(TransactionState::Committing)
    }

    pub(crate) fn finish_commit(&mut self) -> CoordResult<()> {
        self.transition(TransactionState::Committed)
    }

    pub(crate) fn start_rollback(&mut self) -> CoordResult<()> {
        self.transition(TransactionState::RollingBack)
    }

    pub(crate) fn finish_rollback(&mut self) -> CoordResult<()> {
        self.transition(TransactionState::RolledBack)
    }

    /// Ensures the transaction is active.
    pub(crate) fn ensure_active(&self) -> CoordResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoordError::NotActive { state: self.state })
        }
    }

    /// Hands out the index of the next operation.
    pub(crate) fn claim_index(&mut self) -> usize {
        let index = self.attempted;
        self.attempted += 1;
        index
    }

    pub(crate) fn record_success(&mut self) {
        self.executed += 1;
    }

    /// Records an operation failure; only the first one is kept.
    pub(crate) fn record_failure(&mut self, index: usize, error: ResourceError) {
        self.rollback_only = true;
        if self.failure.is_none() {
            self.failure = Some((index, error));
        }
    }

    pub(crate) fn record_interrupt(&mut self, interrupt: Interrupt) {
        self.rollback_only = true;
        if self.interrupt.is_none() {
            self.interrupt = Some(interrupt);
        }
    }

    fn transition(&mut self, to: TransactionState) -> CoordResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(CoordError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(UnitId::new(1), TransactionMode::Explicit)
    }

    #[test]
    fn commit_path() {
        let mut lc = lifecycle();
        assert_eq!(lc.state(), TransactionState::Idle);
        lc.begin().unwrap();
        assert!(lc.is_active());
        lc.start_commit().unwrap();
        lc.finish_commit().unwrap();
        assert_eq!(lc.state(), TransactionState::Committed);
        assert!(lc.state().is_terminal());
    }

    #[test]
    fn commit_failure_rolls_back() {
        let mut lc = lifecycle();
        lc.begin().unwrap();
        lc.start_commit().unwrap();
        lc.start_rollback().unwrap();
        lc.finish_rollback().unwrap();
        assert_eq!(lc.state(), TransactionState::RolledBack);
    }

    #[test]
    fn terminal_states_are_final() {
        let mut lc = lifecycle();
        lc.begin().unwrap();
        lc.start_rollback().unwrap();
        lc.finish_rollback().unwrap();

        let err = lc.begin().unwrap_err();
        assert_eq!(
            err,
            CoordError::InvalidTransition {
                from: TransactionState::RolledBack,
                to: TransactionState::Active,
            }
        );
        assert!(lc.start_commit().is_err());
        assert!(lc.ensure_active().is_err());
    }

    #[test]
    fn idle_cannot_commit() {
        let mut lc = lifecycle();
        assert!(lc.start_commit().is_err());
        assert!(lc.start_rollback().is_err());
    }

    #[test]
    fn first_failure_wins() {
        let mut lc = lifecycle();
        lc.begin().unwrap();
        assert_eq!(lc.claim_index(), 0);
        lc.record_success();
        let first = lc.claim_index();
        lc.record_failure(first, ResourceError::connectivity_fatal("first"));
        let second = lc.claim_index();
        lc.record_failure(second, ResourceError::connectivity_fatal("second"));

        assert!(lc.is_rollback_only());
        let (index, error) = lc.failure().unwrap();
        assert_eq!(*index, 1);
        assert_eq!(error, &ResourceError::connectivity_fatal("first"));
        assert_eq!(lc.executed(), 1);
    }

    #[test]
    fn interrupt_marks_rollback_only() {
        let mut lc = lifecycle();
        lc.begin().unwrap();
        lc.record_interrupt(Interrupt::Cancelled);
        lc.record_interrupt(Interrupt::TimedOut(Duration::from_secs(1)));
        assert!(lc.is_rollback_only());
        assert_eq!(lc.interrupt(), Some(Interrupt::Cancelled));
    }
}
