//! Event store and derived-state store for the personal Nostr gateway.
//!
//! Two SQLite-backed stores share one connection pool: [`EventStore`] holds
//! raw, verified Nostr events (module C1); [`DerivedStore`] holds everything
//! the sync engine computes from them — interaction aggregates, relay
//! hints, graph membership, cursors, relay capabilities and retention
//! bookkeeping (module C2). Both follow `nostr-sqlite`'s connection-pool and
//! migration-gate pattern.

pub mod derived_store;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod filter;
pub mod pool;
pub mod verify;

pub use derived_store::{Aggregate, Capability, DerivedStore, GraphNode, RelayHint, RetentionDecision};
pub use domain::StoredEvent;
pub use error::{Result, StoreError};
pub use event_store::{EventStore, PutOutcome};
pub use filter::StoreFilter;
pub use pool::SqlitePool;

/// Opens both stores against the same on-disk database, running migrations
/// if needed.
pub async fn open(path: &str) -> Result<(EventStore, DerivedStore)> {
    let pool = SqlitePool::open(path).await?;
    Ok((EventStore::new(pool.clone()), DerivedStore::new(pool)))
}

/// Opens both stores against a private in-memory database. Intended for
/// tests and short-lived tooling.
pub async fn open_in_memory() -> Result<(EventStore, DerivedStore)> {
    let pool = SqlitePool::open_in_memory().await?;
    Ok((EventStore::new(pool.clone()), DerivedStore::new(pool)))
}
