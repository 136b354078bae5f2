//! # rxtx Core
//!
//! Transaction coordination for rxtx.
//!
//! This crate provides:
//! - [`TransactionCoordinator`] for blocking resources
//! - [`AsyncTransactionCoordinator`] for async resources
//! - Three demarcation modes: auto-commit, explicit and declarative
//! - A lifecycle state machine shared by every atomic mode
//! - Cancellation and timeouts that always end in rollback
//! - Transaction functions that retry on transient connectivity failures
//!
//! ## Outcomes
//!
//! Every entry point returns an [`Outcome`]:
//!
//! | Mode        | Operation fails           | Cancelled            |
//! |-------------|---------------------------|----------------------|
//! | AutoCommit  | `Failed`, prefix kept     | `Failed`, prefix kept|
//! | Explicit    | `RolledBack`, nothing kept| `RolledBack`         |
//! | Declarative | `RolledBack`, nothing kept| `RolledBack`         |
//!
//! Connectivity failures inside a transaction are still rolled back but
//! reported as `Failed`.
//!
//! ## Example
//!
//! ```rust
//! use rxtx_core::{Outcome, TransactionCoordinator};
//! use rxtx_resource::{Operation, RelationalSchema, RelationalStore, TableDef};
//!
//! let store = RelationalStore::new(
//!     RelationalSchema::new()
//!         .with_table(TableDef::new("person"))
//!         .with_table(TableDef::new("person_event").foreign_key("person_id", "person")),
//! );
//! let coordinator = TransactionCoordinator::new();
//!
//! let outcome = coordinator.run_explicit(
//!     &store,
//!     &[
//!         Operation::insert("person", 1).with("firstName", "Jesse"),
//!         Operation::insert("person_event", 1).with("person_id", 1),
//!     ],
//! );
//! assert!(matches!(outcome, Outcome::Committed(_)));
//! assert_eq!(store.count("person_event"), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod async_coordinator;
mod config;
mod coordinator;
mod error;
mod guard;
mod outcome;
mod transaction;
mod types;

pub use async_coordinator::AsyncTransactionCoordinator;
pub use config::{CoordinatorConfig, RetryConfig};
pub use coordinator::TransactionCoordinator;
pub use error::{CoordError, CoordResult};
pub use guard::{AsyncHandleGuard, HandleGuard};
pub use outcome::{Outcome, OutcomeKind, RollbackReason};
pub use transaction::{
    AsyncTransaction, AsyncTransactionView, ExplicitTransaction, Transaction, TransactionState,
};
pub use types::{TransactionMode, UnitId};

pub use tokio_util::sync::CancellationToken;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
