//! Transaction handles and lifecycle.

mod async_handle;
mod handle;
mod state;
mod watch;

pub use async_handle::{AsyncTransaction, AsyncTransactionView};
pub use handle::{ExplicitTransaction, Transaction};
pub use state::TransactionState;

pub(crate) use state::{Interrupt, Lifecycle};
pub(crate) use watch::Watch;
