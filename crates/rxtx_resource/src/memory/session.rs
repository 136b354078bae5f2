//! Blocking session on an in-memory store.

use super::{Dataset, FaultPoint, Schema, StoreInner};
use crate::error::{ResourceError, ResourceResult};
use crate::operation::{Operation, OperationResult};
use crate::resource::{Resource, ResourceKind};
use std::sync::Arc;

/// Private state of an open transaction.
#[derive(Debug)]
struct PendingTransaction {
    /// Version of the committed data the working copy was taken from.
    base_version: u64,
    /// Committed data plus this transaction's writes.
    working: Dataset,
    /// Writes in execution order, replayed on conflicting commits.
    log: Vec<Operation>,
}

/// A session (connection) on a [`MemoryStore`](super::MemoryStore).
pub struct MemorySession<S: Schema> {
    store: Arc<StoreInner<S>>,
    id: u64,
    tx: Option<PendingTransaction>,
    closed: bool,
}

impl<S: Schema> MemorySession<S> {
    pub(crate) fn new(store: Arc<StoreInner<S>>, id: u64) -> Self {
        Self {
            store,
            id,
            tx: None,
            closed: false,
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true once the session was released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Discards the open transaction, if any, without counting it as a
    /// rollback.
    pub fn abandon(&mut self) {
        if self.tx.take().is_some() {
            self.store.record_abandoned();
            tracing::warn!(handle = self.id, "open transaction abandoned");
        }
    }

    pub(crate) fn close(&mut self) {
        self.abandon();
        self.closed = true;
    }

    fn ensure_open(&self) -> ResourceResult<()> {
        if self.closed {
            Err(ResourceError::Closed)
        } else {
            Ok(())
        }
    }

    fn publish(&self, tx: PendingTransaction) -> ResourceResult<()> {
        let mut shared = self.store.shared.write();
        if shared.version == tx.base_version {
            shared.data = tx.working;
        } else {
            // Someone committed since begin: re-validate our writes on top.
            let mut candidate = shared.data.clone();
            for operation in &tx.log {
                self.store.schema.check(&candidate, operation)?;
                candidate.apply(operation);
            }
            shared.data = candidate;
        }
        shared.version += 1;
        Ok(())
    }
}

impl<S: Schema> Resource for MemorySession<S> {
    fn kind(&self) -> ResourceKind {
        self.store.schema.kind()
    }

    fn execute(&mut self, operation: &Operation) -> ResourceResult<OperationResult> {
        self.ensure_open()?;
        self.store.take_fault(FaultPoint::Execute)?;

        match &mut self.tx {
            Some(tx) => {
                self.store.schema.check(&tx.working, operation)?;
                let result = tx.working.apply(operation);
                tx.log.push(operation.clone());
                Ok(result)
            }
            None => {
                let mut shared = self.store.shared.write();
                self.store.schema.check(&shared.data, operation)?;
                let result = shared.data.apply(operation);
                shared.version += 1;
                self.store.record_auto_commit();
                Ok(result)
            }
        }
    }

    fn begin(&mut self) -> ResourceResult<()> {
        self.ensure_open()?;
        if self.tx.is_some() {
            return Err(ResourceError::TransactionAlreadyActive);
        }
        self.store.take_fault(FaultPoint::Begin)?;

        let shared = self.store.shared.read();
        self.tx = Some(PendingTransaction {
            base_version: shared.version,
            working: shared.data.clone(),
            log: Vec::new(),
        });
        Ok(())
    }

    fn commit(&mut self) -> ResourceResult<()> {
        self.ensure_open()?;
        let tx = self.tx.take().ok_or(ResourceError::NoActiveTransaction)?;

        // The transaction is closed from here on, whatever happens.
        self.store.take_fault(FaultPoint::Commit)?;
        self.publish(tx)?;
        self.store.record_commit();
        Ok(())
    }

    fn rollback(&mut self) -> ResourceResult<()> {
        self.ensure_open()?;
        self.tx.take().ok_or(ResourceError::NoActiveTransaction)?;
        self.store.record_rollback();
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

impl<S: Schema> std::fmt::Debug for MemorySession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("in_transaction", &self.tx.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
