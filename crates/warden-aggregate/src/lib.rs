//! Aggregator (module C9): incremental interaction counters applied at
//! ingest time, a periodic reconciler that recomputes them from raw
//! events, zap invoice amount parsing, and the ranking score.

pub mod bolt11;
pub mod ingest;
pub mod reconciler;
pub mod score;

pub use bolt11::parse_bolt11_amount_sats;
pub use ingest::apply_interaction;
pub use reconciler::{reconcile_recent, recompute};
pub use score::interaction_score;
