//! Reconciliation Protocol (module C8): a range-based set-reconciliation
//! client adapter over the event store, used by the sync engine as an
//! optional, capability-gated alternative to a plain subscription.

pub mod adapter;
pub mod error;
pub mod session;

pub use adapter::StoreAdapter;
pub use error::{ReconcileError, Result};
pub use session::{reconcile_pull, ReconcileOutcome};
