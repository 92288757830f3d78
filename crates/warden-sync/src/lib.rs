//! Sync Engine (module C7): wires discovery, the graph builder, filter
//! construction, reconciliation and the ingest pipeline into one engine
//! over the event and derived stores, and exposes the read-side API a
//! personal gateway's outer surfaces (API/CLI) consume (spec §6.2).

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod state;
pub mod thread;

pub use config::{PerformanceConfig, SyncConfig};
pub use engine::{SyncEngine, TickReport};
pub use error::{Result, SyncError};
pub use ingest::{IngestPipeline, RetentionCallback, RetentionVerdict};
pub use state::{RelayDiagnostics, RelayRegistry, SubscriptionState};
pub use thread::Thread;
