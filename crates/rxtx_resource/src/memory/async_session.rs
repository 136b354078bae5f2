//! Non-blocking facade over an in-memory store.

use super::{MemorySession, MemoryStore, Schema};
use crate::error::ResourceResult;
use crate::operation::{Operation, OperationResult};
use crate::resource::{
    AsyncResource, AsyncResourceProvider, Resource, ResourceKind, ResourceProvider,
};
use async_trait::async_trait;
use std::time::Duration;

/// An [`AsyncResourceProvider`] backed by a [`MemoryStore`].
///
/// Every store round trip first sleeps for the configured latency, which
/// gives callers a real suspension point to cancel at.
pub struct AsyncMemoryStore<S: Schema> {
    store: MemoryStore<S>,
    latency: Duration,
}

impl<S: Schema> Clone for AsyncMemoryStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            latency: self.latency,
        }
    }
}

impl<S: Schema> AsyncMemoryStore<S> {
    /// Creates an async provider over `store`.
    #[must_use]
    pub fn new(store: MemoryStore<S>, latency: Duration) -> Self {
        Self { store, latency }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &MemoryStore<S> {
        &self.store
    }

    /// Returns the simulated round-trip latency.
    #[must_use]
    pub fn latency(&self) -> Duration {
        self.latency
    }
}

#[async_trait]
impl<S: Schema> AsyncResourceProvider for AsyncMemoryStore<S> {
    type Handle = AsyncMemorySession<S>;

    async fn acquire(&self) -> ResourceResult<Self::Handle> {
        round_trip(self.latency).await;
        let session = self.store.acquire()?;
        Ok(AsyncMemorySession {
            session,
            latency: self.latency,
        })
    }

    fn release(&self, handle: Self::Handle) {
        self.store.release(handle.session);
    }
}

/// Session handed out by [`AsyncMemoryStore`].
#[derive(Debug)]
pub struct AsyncMemorySession<S: Schema> {
    session: MemorySession<S>,
    latency: Duration,
}

impl<S: Schema> AsyncMemorySession<S> {
    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.session.id()
    }
}

#[async_trait]
impl<S: Schema> AsyncResource for AsyncMemorySession<S> {
    fn kind(&self) -> ResourceKind {
        self.session.kind()
    }

    async fn execute(&mut self, operation: &Operation) -> ResourceResult<OperationResult> {
        round_trip(self.latency).await;
        self.session.execute(operation)
    }

    async fn begin(&mut self) -> ResourceResult<()> {
        round_trip(self.latency).await;
        self.session.begin()
    }

    async fn commit(&mut self) -> ResourceResult<()> {
        round_trip(self.latency).await;
        self.session.commit()
    }

    async fn rollback(&mut self) -> ResourceResult<()> {
        round_trip(self.latency).await;
        self.session.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.session.in_transaction()
    }

    fn abandon(&mut self) {
        self.session.abandon();
    }
}

async fn round_trip(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}
