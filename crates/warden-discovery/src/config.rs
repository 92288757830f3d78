use serde::Deserialize;

/// Configuration surface consumed by discovery (spec §6.4).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub use_owner_hints: bool,
    pub use_author_hints: bool,
    pub fallback_to_seeds: bool,
    pub max_relays_per_author: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            use_owner_hints: true,
            use_author_hints: true,
            fallback_to_seeds: true,
            max_relays_per_author: 4,
        }
    }
}

/// Relay capability entries are cached for this many seconds (spec §3:
/// "Capabilities: cached 7 days").
pub const CAPABILITY_CACHE_SECONDS: i64 = 7 * 24 * 60 * 60;

/// The NIP number for the range-based set-reconciliation extension.
pub const RECONCILIATION_NIP: u64 = 77;
