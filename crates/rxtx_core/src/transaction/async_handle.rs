//! Async transaction handle.

use super::state::{Interrupt, Lifecycle, TransactionState};
use super::watch::Watch;
use crate::error::CoordResult;
use crate::guard::AsyncHandleGuard;
use crate::outcome::{Outcome, Resolution, RollbackReason};
use crate::types::UnitId;
use rxtx_resource::{
    AsyncResource, AsyncResourceProvider, Operation, OperationResult, ResourceError, ResourceKind,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

struct Slot<'p, P: AsyncResourceProvider> {
    guard: Option<AsyncHandleGuard<'p, P>>,
    lifecycle: Lifecycle,
}

impl<'p, P: AsyncResourceProvider> Slot<'p, P> {
    fn handle(&mut self) -> CoordResult<&mut P::Handle> {
        let guard = self.guard.as_mut().ok_or(ResourceError::Closed)?;
        Ok(guard.handle()?)
    }

    async fn conclude<T>(&mut self, resolution: Resolution<T>) -> CoordResult<Outcome<T>> {
        let unit = self.lifecycle.unit();
        match resolution {
            Resolution::Commit(value) => {
                self.lifecycle.start_commit()?;
                let committed = self.handle()?.commit().await;
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
                        self.roll_back().await?;
                        if error.is_connectivity() {
                            Ok(Outcome::failed(error))
                        } else {
                            Ok(Outcome::RolledBack(RollbackReason::CommitFailed(error)))
                        }
                    }
                }
            }
            Resolution::Rollback(reason) => {
                self.roll_back().await?;
                debug!(unit = %unit, %reason, "transaction rolled back");
                Ok(Outcome::RolledBack(reason))
            }
            Resolution::Abort { operation, error } => {
                self.roll_back().await?;
                debug!(unit = %unit, %error, "transaction aborted");
                Ok(Outcome::Failed { operation, error })
            }
        }
    }

    async fn roll_back(&mut self) -> CoordResult<()> {
        self.lifecycle.start_rollback()?;
        let unit = self.lifecycle.unit();
        let handle = self.handle()?;
        if handle.in_transaction() {
            if let Err(error) = handle.rollback().await {
                warn!(unit = %unit, %error, "rollback failed");
            }
        }
        self.lifecycle.finish_rollback()
    }
}

/// An async transaction.
///
/// Obtained from
/// [`AsyncTransactionCoordinator::begin`](crate::AsyncTransactionCoordinator::begin)
/// and driven with [`commit`](Self::commit) and [`rollback`](Self::rollback).
/// Cheap to clone; all clones share one handle. The handle is released when
/// the transaction ends, or when the last clone is dropped, whichever comes
/// first.
pub struct AsyncTransaction<'p, P: AsyncResourceProvider> {
    slot: Arc<Mutex<Slot<'p, P>>>,
    unit: UnitId,
    kind: ResourceKind,
    watch: Watch,
    log_operations: bool,
}

impl<P: AsyncResourceProvider> Clone for AsyncTransaction<'_, P> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
            unit: self.unit,
            kind: self.kind,
            watch: self.watch.clone(),
            log_operations: self.log_operations,
        }
    }
}

impl<'p, P: AsyncResourceProvider> AsyncTransaction<'p, P> {
    pub(crate) fn new(
        guard: AsyncHandleGuard<'p, P>,
        lifecycle: Lifecycle,
        watch: Watch,
        kind: ResourceKind,
        log_operations: bool,
    ) -> Self {
        let unit = lifecycle.unit();
        Self {
            slot: Arc::new(Mutex::new(Slot {
                guard: Some(guard),
                lifecycle,
            })),
            unit,
            kind,
            watch,
            log_operations,
        }
    }

    /// Returns the unit ID.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.unit
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the lifecycle state.
    pub async fn state(&self) -> TransactionState {
        self.slot.lock().await.lifecycle.state()
    }

    /// Returns whether the transaction will roll back.
    pub async fn is_rollback_only(&self) -> bool {
        self.slot.lock().await.lifecycle.is_rollback_only()
    }

    /// Forces rollback at the end of the unit.
    pub async fn set_rollback_only(&self) {
        self.slot.lock().await.lifecycle.set_rollback_only();
    }

    /// Executes an operation.
    ///
    /// A failure marks the transaction rollback-only. Cancellation and the
    /// deadline race the call; an interrupted call is dropped and the
    /// transaction will roll back.
    pub async fn execute(&self, operation: &Operation) -> CoordResult<OperationResult> {
        let mut slot = self.slot.lock().await;
        slot.lifecycle.ensure_active()?;
        if let Some(interrupt) = self.watch.check() {
            slot.lifecycle.record_interrupt(interrupt);
            return Err(interrupt.into_error());
        }

        let index = slot.lifecycle.claim_index();
        let raced = {
            let handle = slot.handle()?;
            tokio::select! {
                biased;
                interrupt = self.watch.interrupted() => Err(interrupt),
                result = handle.execute(operation) => Ok(result),
            }
        };
        let result = match raced {
            Ok(result) => result,
            Err(interrupt) => {
                debug!(unit = %self.unit, index, %operation, ?interrupt, "operation interrupted");
                slot.lifecycle.record_interrupt(interrupt);
                return Err(interrupt.into_error());
            }
        };
        match result {
            Ok(result) => {
                slot.lifecycle.record_success();
                if self.log_operations {
                    debug!(
                        unit = %self.unit,
                        index,
                        %operation,
                        affected = result.affected,
                        "operation executed"
                    );
                } else {
                    trace!(unit = %self.unit, index, "operation executed");
                }
                Ok(result)
            }
            Err(error) => {
                debug!(unit = %self.unit, index, %operation, %error, "operation failed");
                slot.lifecycle.record_failure(index, error.clone());
                Err(error.into())
            }
        }
    }

    /// Commits, unless a failure, interruption or rollback-only mark forces
    /// a rollback.
    pub async fn commit(self) -> Outcome<()> {
        self.finish(Ok(())).await
    }

    /// Rolls back.
    pub async fn rollback(self) -> Outcome<()> {
        let mut slot = self.slot.lock().await;
        let resolution = match Resolution::decide(&slot.lifecycle, Ok(())) {
            Resolution::Commit(()) | Resolution::Rollback(RollbackReason::RollbackOnly) => {
                Resolution::Rollback(RollbackReason::Requested)
            }
            other => other,
        };
        let outcome = slot
            .conclude(resolution)
            .await
            .unwrap_or_else(|error| Outcome::failed(error));
        drop(slot.guard.take());
        outcome
    }

    /// Returns a view for a declarative unit of work.
    pub(crate) fn view(&self) -> AsyncTransactionView<'p, P> {
        AsyncTransactionView {
            inner: self.clone(),
        }
    }

    /// Drives `work` until it completes or the unit is interrupted.
    ///
    /// On interruption `work` is dropped mid-flight and the interruption is
    /// recorded.
    pub(crate) async fn guarded<T, E, F>(&self, work: F) -> Result<T, String>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let raced: Result<Result<T, E>, Interrupt> = tokio::select! {
            biased;
            interrupt = self.watch.interrupted() => Err(interrupt),
            result = work => Ok(result),
        };
        match raced {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(interrupt) => {
                debug!(unit = %self.unit, ?interrupt, "unit of work interrupted");
                self.slot.lock().await.lifecycle.record_interrupt(interrupt);
                Err(interrupt.into_error().to_string())
            }
        }
    }

    /// Ends the transaction given the result of its unit of work, then
    /// releases the handle.
    pub(crate) async fn finish<T>(self, result: Result<T, String>) -> Outcome<T> {
        let mut slot = self.slot.lock().await;
        if slot.lifecycle.is_active() {
            if let Some(interrupt) = self.watch.check() {
                slot.lifecycle.record_interrupt(interrupt);
            }
        }
        let resolution = Resolution::decide(&slot.lifecycle, result);
        let outcome = slot
            .conclude(resolution)
            .await
            .unwrap_or_else(|error| Outcome::failed(error));
        drop(slot.guard.take());
        outcome
    }
}

impl<P: AsyncResourceProvider> fmt::Debug for AsyncTransaction<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransaction")
            .field("unit", &self.unit)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// An async transaction as seen from inside a declarative unit of work.
///
/// Has no commit or rollback; the coordinator decides once the unit's
/// future completes. Use [`set_rollback_only`](Self::set_rollback_only) to
/// force a rollback.
pub struct AsyncTransactionView<'p, P: AsyncResourceProvider> {
    inner: AsyncTransaction<'p, P>,
}

impl<P: AsyncResourceProvider> Clone for AsyncTransactionView<'_, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: AsyncResourceProvider> AsyncTransactionView<'_, P> {
    /// Returns the unit ID.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.inner.id()
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    /// Returns the lifecycle state.
    pub async fn state(&self) -> TransactionState {
        self.inner.state().await
    }

    /// Returns whether the transaction will roll back.
    pub async fn is_rollback_only(&self) -> bool {
        self.inner.is_rollback_only().await
    }

    /// Forces rollback when the unit completes.
    pub async fn set_rollback_only(&self) {
        self.inner.set_rollback_only().await;
    }

    /// Executes an operation.
    ///
    /// A failure marks the transaction rollback-only, even if the unit
    /// ignores the returned error.
    pub async fn execute(&self, operation: &Operation) -> CoordResult<OperationResult> {
        self.inner.execute(operation).await
    }
}

impl<P: AsyncResourceProvider> fmt::Debug for AsyncTransactionView<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransactionView")
            .field("unit", &self.inner.unit)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}
