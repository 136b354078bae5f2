//! # rxtx Testkit
//!
//! Test utilities for rxtx.
//!
//! This crate provides:
//! - Demonstration schemas and scenarios for every backend kind
//! - [`AnyStore`], a store of any backend kind behind one type
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use rxtx_core::{TransactionCoordinator, TransactionMode};
//! use rxtx_testkit::prelude::*;
//!
//! let coordinator = TransactionCoordinator::new();
//! for backend in Backend::ALL {
//!     let store = backend.store();
//!     let scenario = backend.scenario();
//!     let outcome = store.run(
//!         &coordinator,
//!         TransactionMode::Explicit,
//!         &scenario.dependent_failure,
//!     );
//!     assert!(outcome.is_rolled_back());
//!     assert_eq!(store.snapshot().total(), 0);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
