use std::time::Duration;

use serde::Deserialize;
use warden_graph::GraphConfig;
use warden_retention::RetentionConfig;

/// `sync.performance.*` (spec §6.4).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerformanceConfig {
    pub workers: usize,
    pub use_reconciliation: bool,
    pub reconciliation_fallback: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            use_reconciliation: false,
            reconciliation_fallback: true,
        }
    }
}

/// Configuration surface consumed by the sync engine (spec §6.4): kinds,
/// scope, performance and the timers §4.7/§5 name with defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub kinds: Vec<u64>,
    pub scope: GraphConfig,
    pub include_direct_mentions: bool,
    pub performance: PerformanceConfig,
    pub retention: RetentionConfig,

    #[serde(default = "default_replaceable_refresh_seconds")]
    pub replaceable_refresh_interval_seconds: u64,
    #[serde(default = "default_backfill_timeout_seconds")]
    pub backfill_timeout_seconds: u64,
    #[serde(default = "default_bootstrap_timeout_seconds")]
    pub bootstrap_timeout_seconds: u64,
    #[serde(default = "default_reconciliation_round_timeout_seconds")]
    pub reconciliation_round_timeout_seconds: u64,
    #[serde(default = "default_ingest_channel_capacity")]
    pub ingest_channel_capacity: usize,
    #[serde(default = "default_reconciler_interval_seconds")]
    pub reconciler_interval_seconds: u64,
}

fn default_replaceable_refresh_seconds() -> u64 {
    3600
}
fn default_backfill_timeout_seconds() -> u64 {
    30
}
fn default_bootstrap_timeout_seconds() -> u64 {
    5
}
fn default_reconciliation_round_timeout_seconds() -> u64 {
    20
}
fn default_ingest_channel_capacity() -> usize {
    1000
}
fn default_reconciler_interval_seconds() -> u64 {
    3600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            kinds: vec![1, 6, 7, 9735],
            scope: GraphConfig::default(),
            include_direct_mentions: true,
            performance: PerformanceConfig::default(),
            retention: RetentionConfig { keep_days: None, advanced: None },
            replaceable_refresh_interval_seconds: default_replaceable_refresh_seconds(),
            backfill_timeout_seconds: default_backfill_timeout_seconds(),
            bootstrap_timeout_seconds: default_bootstrap_timeout_seconds(),
            reconciliation_round_timeout_seconds: default_reconciliation_round_timeout_seconds(),
            ingest_channel_capacity: default_ingest_channel_capacity(),
            reconciler_interval_seconds: default_reconciler_interval_seconds(),
        }
    }
}

impl SyncConfig {
    pub fn backfill_timeout(&self) -> Duration {
        Duration::from_secs(self.backfill_timeout_seconds)
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_secs(self.bootstrap_timeout_seconds)
    }

    pub fn reconciliation_round_timeout(&self) -> Duration {
        Duration::from_secs(self.reconciliation_round_timeout_seconds)
    }
}
