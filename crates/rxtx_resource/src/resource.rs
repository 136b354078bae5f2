//! Resource capability traits.

use crate::error::ResourceResult;
use crate::operation::{Operation, OperationResult};
use async_trait::async_trait;
use std::fmt;

/// Kind of backing store behind a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Tables with primary and foreign keys.
    Relational,
    /// Schemaless document collections.
    Document,
    /// Nodes and relationships.
    Graph,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relational => "relational",
            Self::Document => "document",
            Self::Graph => "graph",
        };
        f.write_str(name)
    }
}

/// A blocking handle (connection, session) to a backing store.
///
/// Outside a transaction every `execute` commits on its own. Between
/// `begin` and `commit`/`rollback` the effects stay private to the handle.
///
/// # Invariants
///
/// - `begin` fails with `TransactionAlreadyActive` if a transaction is open
/// - `commit` and `rollback` fail with `NoActiveTransaction` otherwise
/// - a failed `execute` leaves no partial effect of that operation
/// - a failed `commit` publishes nothing and closes the transaction
pub trait Resource: Send {
    /// Returns the kind of store behind this handle.
    fn kind(&self) -> ResourceKind;

    /// Executes one operation.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if a constraint rejects the operation and a
    /// connectivity error if the store cannot be reached.
    fn execute(&mut self, operation: &Operation) -> ResourceResult<OperationResult>;

    /// Opens a transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a transaction is already open or the store is
    /// unreachable.
    fn begin(&mut self) -> ResourceResult<()>;

    /// Publishes the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open or the write set conflicts
    /// with concurrently committed data.
    fn commit(&mut self) -> ResourceResult<()>;

    /// Discards the open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn rollback(&mut self) -> ResourceResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;
}

impl<R: Resource + ?Sized> Resource for Box<R> {
    fn kind(&self) -> ResourceKind {
        (**self).kind()
    }

    fn execute(&mut self, operation: &Operation) -> ResourceResult<OperationResult> {
        (**self).execute(operation)
    }

    fn begin(&mut self) -> ResourceResult<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> ResourceResult<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> ResourceResult<()> {
        (**self).rollback()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }
}

/// Hands out blocking resource handles.
pub trait ResourceProvider: Send + Sync {
    /// Handle type produced by this provider.
    type Handle: Resource;

    /// Acquires a fresh handle.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the store cannot be reached.
    fn acquire(&self) -> ResourceResult<Self::Handle>;

    /// Returns a handle. Any transaction still open on it is discarded.
    fn release(&self, handle: Self::Handle);
}

/// A non-blocking handle to a backing store.
///
/// Same contract as [`Resource`]; every store round trip is a suspension
/// point.
#[async_trait]
pub trait AsyncResource: Send {
    /// Returns the kind of store behind this handle.
    fn kind(&self) -> ResourceKind;

    /// Executes one operation.
    async fn execute(&mut self, operation: &Operation) -> ResourceResult<OperationResult>;

    /// Opens a transaction.
    async fn begin(&mut self) -> ResourceResult<()>;

    /// Publishes the open transaction.
    async fn commit(&mut self) -> ResourceResult<()>;

    /// Discards the open transaction.
    async fn rollback(&mut self) -> ResourceResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Drops any open transaction without a store round trip.
    ///
    /// Used when the owning future is dropped and `rollback` can no longer
    /// be awaited; a network driver would reset or close the connection so
    /// the server discards the transaction.
    fn abandon(&mut self);
}

/// Hands out non-blocking resource handles.
#[async_trait]
pub trait AsyncResourceProvider: Send + Sync {
    /// Handle type produced by this provider.
    type Handle: AsyncResource;

    /// Acquires a fresh handle.
    async fn acquire(&self) -> ResourceResult<Self::Handle>;

    /// Returns a handle. Any transaction still open on it is discarded.
    fn release(&self, handle: Self::Handle);
}
