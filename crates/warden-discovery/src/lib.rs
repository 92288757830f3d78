//! Discovery (module C4): bootstrap, outbox/inbox relay resolution, relay
//! hint fan-out and NIP-11 capability caching.

pub mod config;
pub mod discovery;
pub mod error;

pub use config::{DiscoveryConfig, CAPABILITY_CACHE_SECONDS, RECONCILIATION_NIP};
pub use discovery::Discovery;
pub use error::{DiscoveryError, Result};
