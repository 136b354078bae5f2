//! In-memory backends.
//!
//! One generic store, [`MemoryStore`], parameterised by a [`Schema`] that
//! carries the constraint set of a backend kind:
//!
//! - [`RelationalSchema`] - declared tables, primary/unique/foreign keys
//! - [`DocumentSchema`] - implicit collections, `_id` and unique indexes
//! - [`GraphSchema`] - labelled nodes, unique properties, typed relationships
//!
//! Sessions follow the auto-commit / explicit-transaction contract of
//! [`Resource`](crate::Resource). An open transaction works on a private copy
//! of the committed data and records its write log; commit publishes the copy
//! directly when nothing else committed meanwhile, and otherwise replays the
//! log against the current data, re-checking every constraint.

mod async_session;
mod dataset;
mod document;
mod graph;
mod relational;
mod session;

pub use async_session::{AsyncMemorySession, AsyncMemoryStore};
pub use dataset::{Dataset, Table};
pub use document::DocumentSchema;
pub use graph::{GraphSchema, RelationshipDef, FROM, TO};
pub use relational::{ForeignKey, RelationalSchema, TableDef};
pub use session::MemorySession;

use crate::error::{ResourceError, ResourceResult};
use crate::operation::{Operation, Record, Value};
use crate::resource::{ResourceKind, ResourceProvider};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Constraint set of a backend kind.
pub trait Schema: Send + Sync + 'static {
    /// Returns the backend kind.
    fn kind(&self) -> ResourceKind;

    /// Returns the empty dataset a new store starts from.
    fn initial(&self) -> Dataset {
        Dataset::new()
    }

    /// Validates `operation` against `data` without applying it.
    ///
    /// # Errors
    ///
    /// Returns an integrity error or `UnknownTarget` if the operation must be
    /// rejected.
    fn check(&self, data: &Dataset, operation: &Operation) -> ResourceResult<()>;
}

/// Relational in-memory store.
pub type RelationalStore = MemoryStore<RelationalSchema>;
/// Document in-memory store.
pub type DocumentStore = MemoryStore<DocumentSchema>;
/// Graph in-memory store.
pub type GraphStore = MemoryStore<GraphSchema>;

/// Point at which an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// Handle acquisition.
    Acquire,
    /// Transaction begin.
    Begin,
    /// Operation execution.
    Execute,
    /// Transaction commit.
    Commit,
}

/// Handle and transaction counters of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Handles handed out.
    pub acquired: u64,
    /// Handles returned.
    pub released: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions rolled back on request.
    pub rollbacks: u64,
    /// Transactions discarded because the handle was released or abandoned
    /// while they were still open.
    pub abandoned: u64,
    /// Operations committed outside a transaction.
    pub auto_commits: u64,
}

impl StoreStats {
    /// Returns the number of handles not yet released.
    #[must_use]
    pub fn open_handles(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    abandoned: AtomicU64,
    auto_commits: AtomicU64,
}

/// Committed data plus a version bumped on every publish.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) version: u64,
    pub(crate) data: Dataset,
}

pub(crate) struct StoreInner<S: Schema> {
    pub(crate) schema: S,
    pub(crate) shared: RwLock<Shared>,
    faults: Mutex<Vec<(FaultPoint, ResourceError)>>,
    next_handle: AtomicU64,
    counters: Counters,
}

impl<S: Schema> StoreInner<S> {
    /// Fires the first fault registered for `point`, if any.
    pub(crate) fn take_fault(&self, point: FaultPoint) -> ResourceResult<()> {
        let mut faults = self.faults.lock();
        match faults.iter().position(|(p, _)| *p == point) {
            Some(index) => Err(faults.remove(index).1),
            None => Ok(()),
        }
    }

    pub(crate) fn record_commit(&self) {
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rollback(&self) {
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_abandoned(&self) {
        self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_auto_commit(&self) {
        self.counters.auto_commits.fetch_add(1, Ordering::SeqCst);
    }
}

/// An in-memory store acting as a [`ResourceProvider`].
///
/// Cloning is cheap; clones share the same data.
///
/// # Example
///
/// ```rust
/// use rxtx_resource::{
///     Operation, RelationalSchema, RelationalStore, Resource, ResourceProvider, TableDef,
/// };
///
/// let store = RelationalStore::new(RelationalSchema::new().with_table(TableDef::new("person")));
/// let mut handle = store.acquire().unwrap();
/// handle.execute(&Operation::insert("person", 1).with("first_name", "Jesse")).unwrap();
/// store.release(handle);
///
/// assert_eq!(store.count("person"), 1);
/// assert_eq!(store.stats().open_handles(), 0);
/// ```
pub struct MemoryStore<S: Schema> {
    inner: Arc<StoreInner<S>>,
}

impl<S: Schema> Clone for MemoryStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Schema> MemoryStore<S> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(schema: S) -> Self {
        let data = schema.initial();
        Self {
            inner: Arc::new(StoreInner {
                schema,
                shared: RwLock::new(Shared { version: 0, data }),
                faults: Mutex::new(Vec::new()),
                next_handle: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &S {
        &self.inner.schema
    }

    /// Returns the backend kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.inner.schema.kind()
    }

    /// Returns a copy of the committed data.
    #[must_use]
    pub fn snapshot(&self) -> Dataset {
        self.inner.shared.read().data.clone()
    }

    /// Returns a committed record.
    #[must_use]
    pub fn get(&self, target: &str, key: impl Into<Value>) -> Option<Record> {
        self.inner.shared.read().data.get(target, &key.into()).cloned()
    }

    /// Returns true if a committed record exists under `key`.
    #[must_use]
    pub fn contains(&self, target: &str, key: impl Into<Value>) -> bool {
        self.inner.shared.read().data.contains(target, &key.into())
    }

    /// Returns the number of committed records in a target.
    #[must_use]
    pub fn count(&self, target: &str) -> usize {
        self.inner.shared.read().data.count(target)
    }

    /// Returns the handle and transaction counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            acquired: c.acquired.load(Ordering::SeqCst),
            released: c.released.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            abandoned: c.abandoned.load(Ordering::SeqCst),
            auto_commits: c.auto_commits.load(Ordering::SeqCst),
        }
    }

    /// Makes the next call at `point` fail with `error`.
    ///
    /// Faults queue up; each fires once.
    pub fn fail_next(&self, point: FaultPoint, error: ResourceError) {
        self.inner.faults.lock().push((point, error));
    }

    /// Wraps the store as an async provider whose calls each sleep for
    /// `latency` before touching the data.
    #[must_use]
    pub fn asynchronous(&self, latency: Duration) -> AsyncMemoryStore<S> {
        AsyncMemoryStore::new(self.clone(), latency)
    }
}

impl<S: Schema> ResourceProvider for MemoryStore<S> {
    type Handle = MemorySession<S>;

    fn acquire(&self) -> ResourceResult<Self::Handle> {
        self.inner.take_fault(FaultPoint::Acquire)?;
        let id = self.inner.next_handle.fetch_add(1, Ordering::SeqCst);
        self.inner.counters.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(handle = id, kind = %self.kind(), "handle acquired");
        Ok(MemorySession::new(Arc::clone(&self.inner), id))
    }

    fn release(&self, mut handle: Self::Handle) {
        let id = handle.id();
        handle.close();
        self.inner.counters.released.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(handle = id, kind = %self.kind(), "handle released");
    }
}

impl<S: Schema + std::fmt::Debug> std::fmt::Debug for MemoryStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("schema", &self.inner.schema)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
