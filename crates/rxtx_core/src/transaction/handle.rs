//! Blocking transaction handles.

use super::state::{Lifecycle, TransactionState};
use super::watch::Watch;
use crate::error::CoordResult;
use crate::guard::HandleGuard;
use crate::outcome::{Outcome, Resolution, RollbackReason};
use crate::types::UnitId;
use rxtx_resource::{Operation, OperationResult, Resource, ResourceKind, ResourceProvider};
use tracing::{debug, trace, warn};

/// Runs one operation inside a transaction and records the result.
fn execute_in<R: Resource>(
    resource: &mut R,
    lifecycle: &mut Lifecycle,
    watch: &Watch,
    log_operations: bool,
    operation: &Operation,
) -> CoordResult<OperationResult> {
    lifecycle.ensure_active()?;
    if let Some(interrupt) = watch.check() {
        lifecycle.record_interrupt(interrupt);
        return Err(interrupt.into_error());
    }

    let index = lifecycle.claim_index();
    match resource.execute(operation) {
        Ok(result) => {
            lifecycle.record_success();
            if log_operations {
                debug!(
                    unit = %lifecycle.unit(),
                    index,
                    %operation,
                    affected = result.affected,
                    "operation executed"
                );
            } else {
                trace!(unit = %lifecycle.unit(), index, "operation executed");
            }
            Ok(result)
        }
        Err(error) => {
            debug!(unit = %lifecycle.unit(), index, %operation, %error, "operation failed");
            lifecycle.record_failure(index, error.clone());
            Err(error.into())
        }
    }
}

/// A transaction as seen from inside a declarative unit of work.
///
/// Borrowed for the duration of the unit function; commit and rollback are
/// decided by the coordinator once the function returns.
pub struct Transaction<'t, R: Resource> {
    resource: &'t mut R,
    lifecycle: &'t mut Lifecycle,
    watch: &'t Watch,
    log_operations: bool,
}

impl<'t, R: Resource> Transaction<'t, R> {
    /// Executes an operation.
    ///
    /// A failure marks the transaction rollback-only, even if the caller
    /// ignores the returned error.
    pub fn execute(&mut self, operation: &Operation) -> CoordResult<OperationResult> {
        execute_in(
            self.resource,
            self.lifecycle,
            self.watch,
            self.log_operations,
            operation,
        )
    }

    /// Forces rollback when the unit returns.
    pub fn set_rollback_only(&mut self) {
        self.lifecycle.set_rollback_only();
    }

    /// Returns whether the transaction will roll back.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.lifecycle.is_rollback_only()
    }

    /// Returns the unit ID.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.lifecycle.unit()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.lifecycle.state()
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }

    /// Returns true once cancellation or the deadline has been observed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.lifecycle.interrupt().is_some() || self.watch.check().is_some()
    }
}

/// A transaction driven by the caller.
///
/// Obtained from [`TransactionCoordinator::begin`](crate::TransactionCoordinator::begin).
/// Dropping it without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls back and releases the handle.
pub struct ExplicitTransaction<'p, P: ResourceProvider> {
    guard: HandleGuard<'p, P>,
    lifecycle: Lifecycle,
    watch: Watch,
    kind: ResourceKind,
    log_operations: bool,
}

impl<'p, P: ResourceProvider> ExplicitTransaction<'p, P> {
    pub(crate) fn new(
        guard: HandleGuard<'p, P>,
        lifecycle: Lifecycle,
        watch: Watch,
        kind: ResourceKind,
        log_operations: bool,
    ) -> Self {
        Self {
            guard,
            lifecycle,
            watch,
            kind,
            log_operations,
        }
    }

    /// Returns the unit ID.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.lifecycle.unit()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.lifecycle.state()
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns whether the transaction will roll back.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.lifecycle.is_rollback_only()
    }

    /// Forces rollback on [`commit`](Self::commit).
    pub fn set_rollback_only(&mut self) {
        self.lifecycle.set_rollback_only();
    }

    /// Executes an operation.
    pub fn execute(&mut self, operation: &Operation) -> CoordResult<OperationResult> {
        let handle = self.guard.handle()?;
        execute_in(
            handle,
            &mut self.lifecycle,
            &self.watch,
            self.log_operations,
            operation,
        )
    }

    /// Commits, unless a failure, interruption or rollback-only mark forces
    /// a rollback.
    pub fn commit(self) -> Outcome<()> {
        self.finish(Ok(()))
    }

    /// Rolls back.
    pub fn rollback(mut self) -> Outcome<()> {
        let resolution = match Resolution::decide(&self.lifecycle, Ok(())) {
            Resolution::Commit(()) | Resolution::Rollback(RollbackReason::RollbackOnly) => {
                Resolution::Rollback(RollbackReason::Requested)
            }
            other => other,
        };
        self.conclude(resolution)
    }

    /// Borrows the transaction for a declarative unit function.
    pub(crate) fn view(&mut self) -> CoordResult<Transaction<'_, P::Handle>> {
        Ok(Transaction {
            resource: self.guard.handle()?,
            lifecycle: &mut self.lifecycle,
            watch: &self.watch,
            log_operations: self.log_operations,
        })
    }

    /// Ends the transaction given the result of its unit of work.
    pub(crate) fn finish<T>(mut self, result: Result<T, String>) -> Outcome<T> {
        if self.lifecycle.is_active() {
            if let Some(interrupt) = self.watch.check() {
                self.lifecycle.record_interrupt(interrupt);
            }
        }
        let resolution = Resolution::decide(&self.lifecycle, result);
        self.conclude(resolution)
    }

    fn conclude<T>(&mut self, resolution: Resolution<T>) -> Outcome<T> {
        self.try_conclude(resolution)
            .unwrap_or_else(|error| Outcome::failed(error))
    }

    fn try_conclude<T>(&mut self, resolution: Resolution<T>) -> CoordResult<Outcome<T>> {
        let unit = self.lifecycle.unit();
        match resolution {
            Resolution::Commit(value) => {
                self.lifecycle.start_commit()?;
                let committed = self.guard.handle()?.commit();
                match committed {
                    Ok(()) => {
                        self.lifecycle.finish_commit()?;
                        debug!(
                            unit = %unit,
                            executed = self.lifecycle.executed(),
                            "transaction committed"
                        );
                        Ok(Outcome::Committed(value))
                    }
                    Err(error) => {
                        debug!(unit = %unit, %error, "commit failed");
                        self.roll_back()?;
                        if error.is_connectivity() {
                            Ok(Outcome::failed(error))
                        } else {
                            Ok(Outcome::RolledBack(RollbackReason::CommitFailed(error)))
                        }
                    }
                }
            }
            Resolution::Rollback(reason) => {
                self.roll_back()?;
                debug!(unit = %unit, %reason, "transaction rolled back");
                Ok(Outcome::RolledBack(reason))
            }
            Resolution::Abort { operation, error } => {
                self.roll_back()?;
                debug!(unit = %unit, %error, "transaction aborted");
                Ok(Outcome::Failed { operation, error })
            }
        }
    }

    fn roll_back(&mut self) -> CoordResult<()> {
        self.lifecycle.start_rollback()?;
        let handle = self.guard.handle()?;
        if handle.in_transaction() {
            if let Err(error) = handle.rollback() {
                warn!(unit = %self.lifecycle.unit(), %error, "rollback failed");
            }
        }
        self.lifecycle.finish_rollback()
    }
}

impl<P: ResourceProvider> std::fmt::Debug for ExplicitTransaction<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExplicitTransaction")
            .field("lifecycle", &self.lifecycle)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
