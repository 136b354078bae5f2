//! # rxtx Resource
//!
//! Resource layer for the rxtx transaction coordinator.
//!
//! A *resource* is a connection or session to a backing store. This crate
//! defines the capability set every backend kind exposes to the coordinator
//! and ships in-memory reference backends.
//!
//! ## Capability Set
//!
//! - [`ResourceProvider`] / [`AsyncResourceProvider`] - `acquire` / `release`
//! - [`Resource`] / [`AsyncResource`] - `execute`, `begin`, `commit`, `rollback`
//!
//! Outside a transaction a resource commits every operation on its own
//! (auto-commit). Retrying on transient failures is left to whoever owns the
//! resource; nothing here retries.
//!
//! ## Available Backends
//!
//! - [`RelationalStore`] - tables with primary, unique and foreign keys
//! - [`DocumentStore`] - collections with `_id` and unique indexes
//! - [`GraphStore`] - labelled nodes and typed relationships
//!
//! Each can be wrapped as an async provider with
//! [`MemoryStore::asynchronous`].
//!
//! ## Example
//!
//! ```rust
//! use rxtx_resource::{DocumentSchema, DocumentStore, Operation, Resource, ResourceProvider};
//!
//! let store = DocumentStore::new(DocumentSchema::new());
//! let mut session = store.acquire().unwrap();
//!
//! session.begin().unwrap();
//! session.execute(&Operation::insert("person", 1).with("firstName", "Jesse")).unwrap();
//! session.rollback().unwrap();
//! store.release(session);
//!
//! assert_eq!(store.count("person"), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod operation;
mod resource;

pub use error::{ConstraintKind, ResourceError, ResourceResult};
pub use memory::{
    AsyncMemorySession, AsyncMemoryStore, Dataset, DocumentSchema, DocumentStore, FaultPoint,
    ForeignKey, GraphSchema, GraphStore, MemorySession, MemoryStore, RelationalSchema,
    RelationalStore, RelationshipDef, Schema, StoreStats, Table, TableDef, FROM, TO,
};
pub use operation::{Operation, OperationResult, Record, Value};
pub use resource::{
    AsyncResource, AsyncResourceProvider, Resource, ResourceKind, ResourceProvider,
};
