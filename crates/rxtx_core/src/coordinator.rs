//! Blocking transaction coordinator.

use crate::config::CoordinatorConfig;
use crate::error::{CoordError, CoordResult};
use crate::guard::HandleGuard;
use crate::outcome::Outcome;
use crate::transaction::{ExplicitTransaction, Lifecycle, Transaction, Watch};
use crate::types::{TransactionMode, UnitId};
use rxtx_resource::{Operation, OperationResult, Resource, ResourceProvider};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Demarcates units of work against blocking resources.
///
/// The coordinator runs every operation on the calling thread and holds no
/// state besides its configuration and a unit counter, so one instance can
/// serve any number of providers.
///
/// # Example
///
/// ```rust
/// use rxtx_core::TransactionCoordinator;
/// use rxtx_resource::{DocumentSchema, DocumentStore, Operation};
///
/// let store = DocumentStore::new(DocumentSchema::new());
/// let coordinator = TransactionCoordinator::new();
///
/// let outcome = coordinator.run_declarative(&store, |txn| {
///     txn.execute(&Operation::insert("person", 1).with("firstName", "Jesse"))?;
///     txn.execute(&Operation::insert("person", 1).with("firstName", "Walter"))?;
///     Ok::<_, rxtx_core::CoordError>(())
/// });
///
/// assert!(outcome.is_rolled_back());
/// assert_eq!(store.count("person"), 0);
/// ```
#[derive(Default)]
pub struct TransactionCoordinator {
    config: CoordinatorConfig,
    next_unit: AtomicU64,
}

impl TransactionCoordinator {
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
    pub fn run<P: ResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        self.run_in(self.config.default_mode, provider, operations)
    }

    /// Runs `operations` in `mode`.
    ///
    /// Declarative mode wraps the list in a unit function that stops at the
    /// first failing operation.
    pub fn run_in<P: ResourceProvider>(
        &self,
        mode: TransactionMode,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        match mode {
            TransactionMode::AutoCommit => self.run_auto_commit(provider, operations),
            TransactionMode::Explicit => self.run_explicit(provider, operations),
            TransactionMode::Declarative => self.run_declarative(provider, |txn| {
                operations
                    .iter()
                    .map(|operation| txn.execute(operation))
                    .collect::<CoordResult<Vec<_>>>()
            }),
        }
    }

    /// Runs each operation in its own resource-side commit.
    ///
    /// Stops at the first failure; everything before it stays committed.
    pub fn run_auto_commit<P: ResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        self.run_auto_commit_cancellable(provider, operations, &CancellationToken::new())
    }

    /// Like [`run_auto_commit`](Self::run_auto_commit), checking `token`
    /// before every operation.
    pub fn run_auto_commit_cancellable<P: ResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
        token: &CancellationToken,
    ) -> Outcome<Vec<OperationResult>> {
        let unit = self.next_unit();
        let watch = Watch::start(token.clone(), self.config.timeout);
        if let Some(interrupt) = watch.check() {
            return Outcome::failed(interrupt.into_error());
        }

        let mut guard = match HandleGuard::acquire(provider) {
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
            if let Some(interrupt) = watch.check() {
                debug!(unit = %unit, index, ?interrupt, "auto-commit interrupted");
                return Outcome::Failed {
                    operation: Some(index),
                    error: interrupt.into_error(),
                };
            }
            match handle.execute(operation) {
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
                    debug!(unit = %unit, index, %operation, %error, "auto-commit operation failed");
                    return Outcome::Failed {
                        operation: Some(index),
                        error: error.into(),
                    };
                }
            }
        }

        debug!(unit = %unit, executed = results.len(), "unit completed");
        Outcome::Committed(results)
    }

    /// Begins an explicit transaction.
    pub fn begin<'p, P: ResourceProvider>(
        &self,
        provider: &'p P,
    ) -> CoordResult<ExplicitTransaction<'p, P>> {
        self.begin_cancellable(provider, &CancellationToken::new())
    }

    /// Begins an explicit transaction bound to `token`.
    ///
    /// Once `token` is cancelled, further operations fail and
    /// [`commit`](ExplicitTransaction::commit) rolls back.
    pub fn begin_cancellable<'p, P: ResourceProvider>(
        &self,
        provider: &'p P,
        token: &CancellationToken,
    ) -> CoordResult<ExplicitTransaction<'p, P>> {
        self.open(provider, TransactionMode::Explicit, token)
    }

    fn open<'p, P: ResourceProvider>(
        &self,
        provider: &'p P,
        mode: TransactionMode,
        token: &CancellationToken,
    ) -> CoordResult<ExplicitTransaction<'p, P>> {
        let unit = self.next_unit();
        let watch = Watch::start(token.clone(), self.config.timeout);
        if let Some(interrupt) = watch.check() {
            return Err(interrupt.into_error());
        }

        let mut guard = HandleGuard::acquire(provider)?;
        let handle = guard.handle()?;
        let kind = handle.kind();
        handle.begin()?;

        let mut lifecycle = Lifecycle::new(unit, mode);
        lifecycle.begin()?;
        debug!(unit = %unit, mode = %mode, kind = %kind, "transaction started");

        Ok(ExplicitTransaction::new(
            guard,
            lifecycle,
            watch,
            kind,
            self.config.log_operations,
        ))
    }

    /// Runs `operations` in one transaction.
    ///
    /// The first failure rolls the whole unit back.
    pub fn run_explicit<P: ResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        self.run_explicit_cancellable(provider, operations, &CancellationToken::new())
    }

    /// Like [`run_explicit`](Self::run_explicit), rolling back once `token`
    /// is cancelled.
    pub fn run_explicit_cancellable<P: ResourceProvider>(
        &self,
        provider: &P,
        operations: &[Operation],
        token: &CancellationToken,
    ) -> Outcome<Vec<OperationResult>> {
        let mut txn = match self.begin_cancellable(provider, token) {
            Ok(txn) => txn,
            Err(error) => return Outcome::not_started(error),
        };

        let mut results = Vec::with_capacity(operations.len());
        for operation in operations {
            match txn.execute(operation) {
                Ok(result) => results.push(result),
                Err(error) => return txn.finish(Err(error.to_string())),
            }
        }
        txn.finish(Ok(results))
    }

    /// Runs `unit` inside a transaction.
    ///
    /// Commits when `unit` returns `Ok` and nothing marked the transaction
    /// rollback-only; rolls back otherwise. If `unit` panics, the handle
    /// guard rolls back and releases during unwinding.
    pub fn run_declarative<P, F, T, E>(&self, provider: &P, unit: F) -> Outcome<T>
    where
        P: ResourceProvider,
        F: FnOnce(&mut Transaction<'_, P::Handle>) -> Result<T, E>,
        E: fmt::Display,
    {
        self.run_declarative_cancellable(provider, &CancellationToken::new(), unit)
    }

    /// Like [`run_declarative`](Self::run_declarative), bound to `token`.
    ///
    /// Cancellation is observed at operation boundaries; the unit can also
    /// poll [`Transaction::is_interrupted`].
    pub fn run_declarative_cancellable<P, F, T, E>(
        &self,
        provider: &P,
        token: &CancellationToken,
        unit: F,
    ) -> Outcome<T>
    where
        P: ResourceProvider,
        F: FnOnce(&mut Transaction<'_, P::Handle>) -> Result<T, E>,
        E: fmt::Display,
    {
        let mut txn = match self.open(provider, TransactionMode::Declarative, token) {
            Ok(txn) => txn,
            Err(error) => return Outcome::not_started(error),
        };
        let result = match txn.view() {
            Ok(mut view) => unit(&mut view).map_err(|e| e.to_string()),
            Err(error) => Err(error.to_string()),
        };
        txn.finish(result)
    }

    /// Runs `unit` as a transaction function.
    ///
    /// The unit is re-run on a freshly acquired handle while the outcome is a
    /// transient connectivity failure, up to the configured attempts.
    pub fn run_transaction_function<P, F, T, E>(&self, provider: &P, mut unit: F) -> Outcome<T>
    where
        P: ResourceProvider,
        F: FnMut(&mut Transaction<'_, P::Handle>) -> Result<T, E>,
        E: fmt::Display,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let outcome = self.run_declarative(provider, &mut unit);
            attempt += 1;
            if !outcome.is_transient() || attempt >= retry.max_attempts {
                return outcome;
            }
            let delay = retry.delay_for_attempt(attempt);
            debug!(attempt, ?delay, "transient failure, retrying transaction function");
            std::thread::sleep(delay);
        }
    }
}

impl fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
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
    use rxtx_resource::{
        ConstraintKind, DocumentSchema, DocumentStore, FaultPoint, RelationalSchema,
        RelationalStore, ResourceError, TableDef,
    };

    fn people() -> RelationalStore {
        RelationalStore::new(
            RelationalSchema::new()
                .with_table(TableDef::new("person"))
                .with_table(TableDef::new("person_event").foreign_key("person_id", "person")),
        )
    }

    fn insert_person(id: i64) -> Operation {
        Operation::insert("person", id).with("firstName", "Jesse")
    }

    #[test]
    fn unit_ids_increase() {
        let coordinator = TransactionCoordinator::new();
        assert_eq!(coordinator.next_unit(), UnitId::new(1));
        assert_eq!(coordinator.next_unit(), UnitId::new(2));
    }

    #[test]
    fn explicit_commits() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let outcome = coordinator.run_explicit(&store, &[insert_person(1), insert_person(2)]);

        assert_eq!(outcome.value().map(Vec::len), Some(2));
        assert_eq!(store.count("person"), 2);
        assert_eq!(store.stats().commits, 1);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[test]
    fn explicit_rolls_back_on_integrity_error() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let outcome = coordinator.run_explicit(&store, &[insert_person(1), insert_person(1)]);

        match outcome {
            Outcome::RolledBack(RollbackReason::OperationFailed { index, error }) => {
                assert_eq!(index, 1);
                assert_eq!(error.constraint(), Some(ConstraintKind::PrimaryKey));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.count("person"), 0);
    }

    #[test]
    fn explicit_handle_drop_rolls_back() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        {
            let mut txn = coordinator.begin(&store).unwrap();
            txn.execute(&insert_person(1)).unwrap();
            assert_eq!(txn.state(), TransactionState::Active);
        }
        assert_eq!(store.count("person"), 0);
        assert_eq!(store.stats().released, 1);
    }

    #[test]
    fn explicit_rollback_on_request() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let mut txn = coordinator.begin(&store).unwrap();
        txn.execute(&insert_person(1)).unwrap();

        assert_eq!(txn.rollback(), Outcome::RolledBack(RollbackReason::Requested));
        assert_eq!(store.count("person"), 0);
    }

    #[test]
    fn declarative_rollback_only() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let outcome = coordinator.run_declarative(&store, |txn| {
            txn.execute(&insert_person(1))?;
            txn.set_rollback_only();
            Ok::<_, CoordError>(())
        });

        assert_eq!(outcome, Outcome::RolledBack(RollbackReason::RollbackOnly));
        assert_eq!(store.count("person"), 0);
    }

    #[test]
    fn declarative_swallowed_error_rolls_back() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let outcome = coordinator.run_declarative(&store, |txn| {
            txn.execute(&insert_person(1))?;
            let _ = txn.execute(&insert_person(1));
            assert!(txn.is_rollback_only());
            txn.execute(&insert_person(2))?;
            Ok::<_, CoordError>(())
        });

        assert!(matches!(
            outcome,
            Outcome::RolledBack(RollbackReason::OperationFailed { index: 1, .. })
        ));
        assert_eq!(store.count("person"), 0);
    }

    #[test]
    fn declarative_unit_error_rolls_back() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let outcome: Outcome<()> = coordinator.run_declarative(&store, |txn| {
            txn.execute(&insert_person(1))?;
            Err(CoordError::unit_failed("validation failed"))
        });

        assert!(matches!(outcome, Outcome::RolledBack(RollbackReason::UnitFailed(_))));
        assert_eq!(store.count("person"), 0);
    }

    #[test]
    fn declarative_panic_releases_handle() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            coordinator.run_declarative(&store, |txn| {
                txn.execute(&insert_person(1))?;
                if txn.id().as_u64() > 0 {
                    panic!("unit of work panicked");
                }
                Ok::<_, CoordError>(())
            })
        }));

        assert!(result.is_err());
        assert_eq!(store.count("person"), 0);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[test]
    fn connectivity_error_is_failed_not_rolled_back() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        store.fail_next(FaultPoint::Execute, ResourceError::connectivity_fatal("connection reset"));

        let outcome = coordinator.run_explicit(&store, &[insert_person(1)]);
        assert!(matches!(outcome, Outcome::Failed { operation: Some(0), .. }));
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[test]
    fn commit_failure_rolls_back() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        store.fail_next(
            FaultPoint::Commit,
            ResourceError::integrity(ConstraintKind::Unique, "person", "serialization failure"),
        );

        let outcome = coordinator.run_explicit(&store, &[insert_person(1)]);
        assert!(matches!(outcome, Outcome::RolledBack(RollbackReason::CommitFailed(_))));
        assert_eq!(store.count("person"), 0);
    }

    #[test]
    fn acquire_failure_reported() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        store.fail_next(FaultPoint::Acquire, ResourceError::connectivity_fatal("refused"));

        let outcome = coordinator.run_auto_commit(&store, &[insert_person(1)]);
        assert!(matches!(outcome, Outcome::Failed { operation: None, .. }));
    }

    #[test]
    fn cancelled_before_start() {
        let store = DocumentStore::new(DocumentSchema::new());
        let coordinator = TransactionCoordinator::new();
        let token = CancellationToken::new();
        token.cancel();

        let outcome =
            coordinator.run_explicit_cancellable(&store, &[Operation::insert("person", 1)], &token);
        assert_eq!(outcome, Outcome::RolledBack(RollbackReason::Cancelled));
        assert_eq!(store.stats().acquired, 0);
    }

    #[test]
    fn cancelled_mid_unit_rolls_back() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let token = CancellationToken::new();

        let outcome = coordinator.run_declarative_cancellable(&store, &token, |txn| {
            txn.execute(&insert_person(1))?;
            token.cancel();
            txn.execute(&insert_person(2))?;
            Ok::<_, CoordError>(())
        });

        assert_eq!(outcome, Outcome::RolledBack(RollbackReason::Cancelled));
        assert_eq!(store.count("person"), 0);
        assert_eq!(store.stats().released, 1);
    }

    #[test]
    fn run_dispatches_default_mode() {
        let store = people();
        let coordinator = TransactionCoordinator::with_config(
            CoordinatorConfig::new().default_mode(TransactionMode::AutoCommit),
        );
        let outcome = coordinator.run(&store, &[insert_person(1), insert_person(1)]);

        assert!(matches!(outcome, Outcome::Failed { operation: Some(1), .. }));
        assert_eq!(store.count("person"), 1);
    }

    #[test]
    fn transaction_function_retries_transient_failures() {
        let store = people();
        let coordinator = TransactionCoordinator::with_config(CoordinatorConfig::new().retry(
            crate::config::RetryConfig::new(3)
                .with_initial_delay(std::time::Duration::ZERO)
                .with_jitter(false),
        ));
        store.fail_next(FaultPoint::Begin, ResourceError::connectivity_transient("leader switch"));

        let mut attempts = 0;
        let outcome = coordinator.run_transaction_function(&store, |txn| {
            attempts += 1;
            txn.execute(&insert_person(1))
        });

        assert!(outcome.is_committed());
        assert_eq!(attempts, 1);
        assert_eq!(store.stats().acquired, 2);
        assert_eq!(store.count("person"), 1);
    }

    #[test]
    fn transaction_function_gives_up_on_non_transient() {
        let store = people();
        let coordinator = TransactionCoordinator::new();
        let mut attempts = 0;
        let outcome = coordinator.run_transaction_function(&store, |txn| {
            attempts += 1;
            txn.execute(&insert_person(1))?;
            txn.execute(&insert_person(1))
        });

        assert!(outcome.is_rolled_back());
        assert_eq!(attempts, 1);
    }
}
