//! Scoped handle acquisition.
//!
//! A guard owns a handle from `acquire` until it is dropped and hands it
//! back to its provider exactly once. If a transaction is still open at
//! that point (panic, early return, dropped future) it is rolled back
//! (blocking) or abandoned (async) before release.

use rxtx_resource::{
    AsyncResource, AsyncResourceProvider, Resource, ResourceError, ResourceProvider,
    ResourceResult,
};
use std::fmt;
use tracing::warn;

/// Blocking handle guard.
pub struct HandleGuard<'p, P: ResourceProvider> {
    provider: &'p P,
    handle: Option<P::Handle>,
}

impl<'p, P: ResourceProvider> HandleGuard<'p, P> {
    /// Acquires a handle from `provider`.
    pub fn acquire(provider: &'p P) -> ResourceResult<Self> {
        let handle = provider.acquire()?;
        Ok(Self {
            provider,
            handle: Some(handle),
        })
    }

    /// Returns the guarded handle.
    pub fn handle(&mut self) -> ResourceResult<&mut P::Handle> {
        self.handle.as_mut().ok_or(ResourceError::Closed)
    }
}

impl<P: ResourceProvider> Drop for HandleGuard<'_, P> {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if handle.in_transaction() {
            warn!(kind = %handle.kind(), "releasing handle with open transaction, rolling back");
            if let Err(e) = handle.rollback() {
                warn!(error = %e, "rollback on release failed");
            }
        }
        self.provider.release(handle);
    }
}

impl<P: ResourceProvider> fmt::Debug for HandleGuard<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleGuard")
            .field("held", &self.handle.is_some())
            .finish()
    }
}

/// Async handle guard.
///
/// `Drop` cannot await, so an open transaction is abandoned rather than
/// rolled back. The coordinator awaits the rollback itself on every path it
/// controls; only a dropped future reaches the abandon path.
pub struct AsyncHandleGuard<'p, P: AsyncResourceProvider> {
    provider: &'p P,
    handle: Option<P::Handle>,
}

impl<'p, P: AsyncResourceProvider> AsyncHandleGuard<'p, P> {
    /// Acquires a handle from `provider`.
    pub async fn acquire(provider: &'p P) -> ResourceResult<Self> {
        let handle = provider.acquire().await?;
        Ok(Self {
            provider,
            handle: Some(handle),
        })
    }

    /// Returns the guarded handle.
    pub fn handle(&mut self) -> ResourceResult<&mut P::Handle> {
        self.handle.as_mut().ok_or(ResourceError::Closed)
    }
}

impl<P: AsyncResourceProvider> Drop for AsyncHandleGuard<'_, P> {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        if handle.in_transaction() {
            handle.abandon();
        }
        self.provider.release(handle);
    }
}

impl<P: AsyncResourceProvider> fmt::Debug for AsyncHandleGuard<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandleGuard")
            .field("held", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxtx_resource::{DocumentSchema, DocumentStore, FaultPoint, Operation};
    use std::time::Duration;

    #[test]
    fn release_on_drop() {
        let store = DocumentStore::new(DocumentSchema::new());
        {
            let mut guard = HandleGuard::acquire(&store).unwrap();
            guard.handle().unwrap().execute(&Operation::insert("person", 1)).unwrap();
            assert_eq!(store.stats().open_handles(), 1);
        }
        let stats = store.stats();
        assert_eq!(stats.acquired, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(store.count("person"), 1);
    }

    #[test]
    fn drop_rolls_back_open_transaction() {
        let store = DocumentStore::new(DocumentSchema::new());
        {
            let mut guard = HandleGuard::acquire(&store).unwrap();
            let handle = guard.handle().unwrap();
            handle.begin().unwrap();
            handle.execute(&Operation::insert("person", 1)).unwrap();
        }
        assert_eq!(store.count("person"), 0);
        assert_eq!(store.stats().rollbacks, 1);
        assert_eq!(store.stats().open_handles(), 0);
    }

    #[test]
    fn release_during_panic() {
        let store = DocumentStore::new(DocumentSchema::new());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = HandleGuard::acquire(&store).unwrap();
            guard.handle().unwrap().begin().unwrap();
            panic!("unit of work blew up");
        }));
        assert!(result.is_err());
        assert_eq!(store.stats().released, 1);
        assert_eq!(store.stats().rollbacks, 1);
    }

    #[test]
    fn failed_acquire_holds_nothing() {
        let store = DocumentStore::new(DocumentSchema::new());
        store.fail_next(FaultPoint::Acquire, ResourceError::connectivity_fatal("refused"));
        assert!(HandleGuard::acquire(&store).is_err());
        assert_eq!(store.stats().acquired, 0);
        assert_eq!(store.stats().released, 0);
    }

    #[tokio::test]
    async fn async_drop_abandons() {
        let store = DocumentStore::new(DocumentSchema::new());
        let provider = store.asynchronous(Duration::ZERO);
        {
            let mut guard = AsyncHandleGuard::acquire(&provider).await.unwrap();
            let handle = guard.handle().unwrap();
            handle.begin().await.unwrap();
            handle.execute(&Operation::insert("person", 1)).await.unwrap();
        }
        let stats = store.stats();
        assert_eq!(stats.abandoned, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(store.count("person"), 0);
    }
}
