//! Non-blocking transaction coordinator.

use crate::config::CoordinatorConfig;
use crate::error::{CoordError, CoordResult};
use crate::guard::AsyncHandleGuard;
use crate::outcome::Outcome;
use crate::transaction::{AsyncTransaction, AsyncTransactionView, Lifecycle, Watch};
use crate::types::{TransactionMode, UnitId};
use rxtx_resource::{AsyncResource, AsyncResourceProvider, Operation, OperationResult};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Demarcates units of work against async resources.
///
/// Suspension only happens inside resource calls. Cancellation and the
/// configured timeout race the in-flight call; for atomic modes the
/// coordinator then awaits the rollback before releasing the handle.
/// Dropping a returned future is a cancellation as well: the handle guard
/// abandons the open transaction and releases the handle synchronously.
#[derive(Default)]
pub struct AsyncTransactionCoordinator {
    config: CoordinatorConfig,
    next_unit: AtomicU64,
}

impl AsyncTransactionCoordinator {
    /// Creates a coordinator with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a coordinator with the given configuration.
    #[must_use]
    pub fn with_config(config: CoordinatorConfig) -> Self {
        Self {
            config,
            next_unit: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn next_unit(&self) -> UnitId {
        UnitId::new(self.next_unit.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Runs `operations` in the configured default mode.
    pub async fn run<P: AsyncResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        self.run_in(self.config.default_mode, provider, operations)
            .await
    }

    /// Runs `operations` in `mode`.
    pub async fn run_in<P: AsyncResourceProvider>(
        &self,
        mode: TransactionMode,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        match mode {
            TransactionMode::AutoCommit => self.run_auto_commit(provider, operations).await,
            TransactionMode::Explicit => self.run_explicit(provider, operations).await,
            TransactionMode::Declarative => {
                self.run_declarative(provider, |txn| async move {
                    let mut results = Vec::with_capacity(operations.len());
                    for operation in operations {
                        results.push(txn.execute(operation).await?);
                    }
                    Ok::<_, CoordError>(results)
                })
                .await
            }
        }
    }

    /// Runs each operation in its own resource-side commit.
    pub async fn run_auto_commit<P: AsyncResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        self.run_auto_commit_cancellable(provider, operations, &CancellationToken::new())
            .await
    }

    /// Like [`run_auto_commit`](Self::run_auto_commit), racing `token`.
    ///
    /// An operation in flight when `token` fires is dropped; whether a real
    /// driver applied it is up to the driver. Operations before it stay
    /// committed.
    pub async fn run_auto_commit_cancellable<P: AsyncResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
        token: &CancellationToken,
    ) -> Outcome<Vec<OperationResult>> {
        let unit = self.next_unit();
        let watch = Watch::start(token.clone(), self.config.timeout);

        let acquired = tokio::select! {
            biased;
            interrupt = watch.interrupted() => Err(interrupt.into_error()),
            guard = AsyncHandleGuard::acquire(provider) => guard.map_err(CoordError::from),
        };
        let mut guard = match acquired {
            Ok(guard) => guard,
            Err(error) => return Outcome::failed(error),
        };
        let handle = match guard.handle() {
            Ok(handle) => handle,
            Err(error) => return Outcome::failed(error),
        };
        debug!(
            unit = %unit,
            mode = %TransactionMode::AutoCommit,
            kind = %handle.kind(),
            operations = operations.len(),
            "unit started"
        );

        let mut results = Vec::with_capacity(operations.len());
        for (index, operation) in operations.iter().enumerate() {
            let step = tokio::select! {
                biased;
                interrupt = watch.interrupted() => Err(interrupt.into_error()),
                result = handle.execute(operation) => result.map_err(CoordError::from),
            };
            match step {
                Ok(result) => {
                    if self.config.log_operations {
                        debug!(
                            unit = %unit,
                            index,
                            %operation,
                            affected = result.affected,
                            "operation committed"
                        );
                    }
                    results.push(result);
                }
                Err(error) => {
                    debug!(unit = %unit, index, %operation, %error, "auto-commit stopped");
                    return Outcome::Failed {
                        operation: Some(index),
                        error,
                    };
                }
            }
        }

        debug!(unit = %unit, executed = results.len(), "unit completed");
        Outcome::Committed(results)
    }

    /// Begins an explicit transaction.
    pub async fn begin<'p, P: AsyncResourceProvider>(
        &self,
        provider: &'p P,
    ) -> CoordResult<AsyncTransaction<'p, P>> {
        self.begin_cancellable(provider, &CancellationToken::new())
            .await
    }

    /// Begins an explicit transaction bound to `token`.
    pub async fn begin_cancellable<'p, P: AsyncResourceProvider>(
        &self,
        provider: &'p P,
        token: &CancellationToken,
    ) -> CoordResult<AsyncTransaction<'p, P>> {
        self.open(provider, TransactionMode::Explicit, token).await
    }

    async fn open<'p, P: AsyncResourceProvider>(
        &self,
        provider: &'p P,
        mode: TransactionMode,
        token: &CancellationToken,
    ) -> CoordResult<AsyncTransaction<'p, P>> {
        let unit = self.next_unit();
        let watch = Watch::start(token.clone(), self.config.timeout);

        let started = tokio::select! {
            biased;
            interrupt = watch.interrupted() => Err(interrupt.into_error()),
            guard = Self::acquire_and_begin(provider) => guard,
        };
        let mut guard = started?;
        let kind = guard.handle()?.kind();

        let mut lifecycle = Lifecycle::new(unit, mode);
        lifecycle.begin()?;
        debug!(unit = %unit, mode = %mode, kind = %kind, "transaction started");

        Ok(AsyncTransaction::new(
            guard,
            lifecycle,
            watch,
            kind,
            self.config.log_operations,
        ))
    }

    async fn acquire_and_begin<P: AsyncResourceProvider>(
        provider: &P,
    ) -> CoordResult<AsyncHandleGuard<'_, P>> {
        let mut guard = AsyncHandleGuard::acquire(provider).await?;
        guard.handle()?.begin().await?;
        Ok(guard)
    }

    /// Runs `operations` in one transaction.
    pub async fn run_explicit<P: AsyncResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        self.run_explicit_cancellable(provider, operations, &CancellationToken::new())
            .await
    }

    /// Like [`run_explicit`](Self::run_explicit), rolling back once `token`
    /// fires.
    pub async fn run_explicit_cancellable<P: AsyncResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
        token: &CancellationToken,
    ) -> Outcome<Vec<OperationResult>> {
        let txn = match self.begin_cancellable(provider, token).await {
            Ok(txn) => txn,
            Err(error) => return Outcome::not_started(error),
        };

        let work = async {
            let mut results = Vec::with_capacity(operations.len());
            for operation in operations {
                results.push(txn.execute(operation).await?);
            }
            Ok::<_, CoordError>(results)
        };
        let result = txn.guarded(work).await;
        txn.finish(result).await
    }

    /// Runs the future returned by `unit` inside a transaction.
    ///
    /// The unit receives a view of the transaction without commit or
    /// rollback; the outcome is decided when its future completes.
    pub async fn run_declarative<'p, P, F, Fut, T, E>(&self, provider: &'p P, unit: F) -> Outcome<T>
    where
        P: AsyncResourceProvider,
        F: FnOnce(AsyncTransactionView<'p, P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run_declarative_cancellable(provider, &CancellationToken::new(), unit)
            .await
    }

    /// Like [`run_declarative`](Self::run_declarative), bound to `token`.
    ///
    /// When `token` fires the unit's future is dropped at its current
    /// suspension point and the transaction is rolled back.
    pub async fn run_declarative_cancellable<'p, P, F, Fut, T, E>(
        &self,
        provider: &'p P,
        token: &CancellationToken,
        unit: F,
    ) -> Outcome<T>
    where
        P: AsyncResourceProvider,
        F: FnOnce(AsyncTransactionView<'p, P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let txn = match self.open(provider, TransactionMode::Declarative, token).await {
            Ok(txn) => txn,
            Err(error) => return Outcome::not_started(error),
        };
        let result = txn.guarded(unit(txn.view())).await;
        txn.finish(result).await
    }

    /// Runs `unit` as a transaction function, re-running it on transient
    /// connectivity failures.
    pub async fn run_transaction_function<'p, P, F, Fut, T, E>(
        &self,
        provider: &'p P,
        mut unit: F,
    ) -> Outcome<T>
    where
        P: AsyncResourceProvider,
        F: FnMut(AsyncTransactionView<'p, P>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let outcome = self.run_declarative(provider, &mut unit).await;
            attempt += 1;
            if !outcome.is_transient() || attempt >= retry.max_attempts {
                return outcome;
            }
            let delay = retry.delay_for_attempt(attempt);
            debug!(attempt, ?delay, "transient failure, retrying transaction function");
            tokio::time::sleep(delay).await;
        }
    }
}

impl fmt::Debug for AsyncTransactionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTransactionCoordinator")
            .field("config", &self.config)
            .field("units", &self.next_unit.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::RollbackReason;
    use crate::transaction::TransactionState;
    use rxtx_resource::{DocumentSchema, DocumentStore};
    use std::time::Duration;

    fn insert(id: i64) -> Operation {
        Operation::insert("person", id).with("firstName", "Jesse")
    }

    #[tokio::test]
    async fn declarative_commits() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::ZERO);
        let coordinator = AsyncTransactionCoordinator::new();

        let outcome = coordinator
            .run_declarative(&provider, |txn| async move {
                txn.execute(&insert(1)).await?;
                txn.execute(&insert(2)).await?;
                Ok::<_, CoordError>(txn.id())
            })
            .await;

        assert!(outcome.is_committed());
        assert_eq!(store.count("person"), 2);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[tokio::test]
    async fn explicit_rollback_on_duplicate() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::ZERO);
        let coordinator = AsyncTransactionCoordinator::new();

        let outcome = coordinator
            .run_explicit(&provider, &[insert(1), insert(1)])
            .await;

        assert!(matches!(
            outcome,
            Outcome::RolledBack(RollbackReason::OperationFailed { index: 1, .. })
        ));
        assert_eq!(store.count("person"), 0);
    }

    #[tokio::test]
    async fn explicit_handle_commit() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::ZERO);
        let coordinator = AsyncTransactionCoordinator::new();

        let txn = coordinator.begin(&provider).await.unwrap();
        txn.execute(&insert(1)).await.unwrap();
        assert_eq!(store.count("person"), 0);
        assert_eq!(txn.commit().await, Outcome::Committed(()));
        assert_eq!(store.count("person"), 1);
        assert_eq!(store.stats().released, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_races_in_flight_operation() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::from_millis(10));
        let coordinator = AsyncTransactionCoordinator::new();
        let token = CancellationToken::new();

        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(35)).await;
                token.cancel();
            })
        };

        let ops: Vec<_> = (1..=10).map(insert).collect();
        let outcome = coordinator
            .run_explicit_cancellable(&provider, &ops, &token)
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome, Outcome::RolledBack(RollbackReason::Cancelled));
        assert_eq!(store.count("person"), 0);
        let stats = store.stats();
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.released, 1);
    }

    #[tokio::test]
    async fn declarative_unit_error_rolls_back_its_writes() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::ZERO);
        let coordinator = AsyncTransactionCoordinator::new();

        let outcome = coordinator
            .run_declarative(&provider, |txn| async move {
                txn.execute(&insert(1)).await?;
                Err::<(), _>(CoordError::unit_failed("business rule"))
            })
            .await;

        assert!(matches!(
            outcome,
            Outcome::RolledBack(RollbackReason::UnitFailed(_))
        ));
        assert_eq!(store.count("person"), 0);
        let stats = store.stats();
        assert_eq!(stats.commits, 0);
        assert_eq!(stats.rollbacks, 1);
        assert_eq!(stats.open_handles(), 0);
    }

    #[tokio::test]
    async fn declarative_rollback_only_then_ok_rolls_back() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::ZERO);
        let coordinator = AsyncTransactionCoordinator::new();

        let outcome = coordinator
            .run_declarative(&provider, |txn| async move {
                txn.execute(&insert(1)).await?;
                txn.set_rollback_only().await;
                assert!(txn.is_rollback_only().await);
                assert_eq!(txn.state().await, TransactionState::Active);
                Ok::<_, CoordError>(())
            })
            .await;

        assert_eq!(outcome, Outcome::RolledBack(RollbackReason::RollbackOnly));
        assert_eq!(store.count("person"), 0);
        assert_eq!(store.stats().commits, 0);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_execute_is_interrupted_mid_call() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::from_millis(10));
        let coordinator = AsyncTransactionCoordinator::new();
        let token = CancellationToken::new();

        let txn = coordinator
            .begin_cancellable(&provider, &token)
            .await
            .unwrap();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                token.cancel();
            })
        };

        let started = tokio::time::Instant::now();
        let result = txn.execute(&insert(1)).await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(CoordError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(10));
        assert_eq!(txn.commit().await, Outcome::RolledBack(RollbackReason::Cancelled));
        assert_eq!(store.count("person"), 0);
        assert_eq!(store.stats().commits, 0);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_cancellation() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::from_millis(10));
        let coordinator = AsyncTransactionCoordinator::with_config(
            CoordinatorConfig::new().timeout(Duration::from_millis(25)),
        );

        let outcome = coordinator
            .run_declarative(&provider, |txn| async move {
                for id in 1..=10 {
                    txn.execute(&insert(id)).await?;
                }
                Ok::<_, CoordError>(())
            })
            .await;

        assert_eq!(
            outcome,
            Outcome::RolledBack(RollbackReason::TimedOut(Duration::from_millis(25)))
        );
        assert_eq!(store.count("person"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_commit_cancel_keeps_prefix() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::from_millis(10));
        let coordinator = AsyncTransactionCoordinator::with_config(
            CoordinatorConfig::new().timeout(Duration::from_millis(35)),
        );

        let ops: Vec<_> = (1..=10).map(insert).collect();
        let outcome = coordinator.run_auto_commit(&provider, &ops).await;

        assert!(matches!(
            outcome,
            Outcome::Failed {
                error: CoordError::TimedOut(_),
                ..
            }
        ));
        let committed = store.count("person");
        assert!(committed > 0 && committed < 10);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_future_abandons_and_releases() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::from_millis(10));
        let coordinator = AsyncTransactionCoordinator::new();

        let ops: Vec<_> = (1..=10).map(insert).collect();
        let run = coordinator.run_explicit(&provider, &ops);
        let timed = tokio::time::timeout(Duration::from_millis(35), run).await;

        assert!(timed.is_err());
        let stats = store.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(store.count("person"), 0);
    }
}
