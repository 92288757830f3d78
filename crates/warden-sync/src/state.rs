//! Per-(relay, kind-scope) subscription state machine (spec §4.7).
//!
//! ```text
//! [initial] -- start --> [connecting]
//! [connecting] -- session up --> [backfilling]
//! [backfilling] -- EOSE --> [live]
//! [live] -- cancel --> [closed]
//! [any] -- error --> [backoff] -- expiry --> [connecting]
//! ```

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Initial,
    Connecting,
    Backfilling,
    Live,
    Backoff,
    Closed,
}

/// Default reconnect sequence; capped at the last entry (spec §3).
const BACKOFF_SEQUENCE_SECONDS: [u64; 6] = [1, 2, 5, 10, 30, 60];

/// Per-relay diagnostics (spec §B.2/§B.3, §7): connection state, a
/// consecutive-failure counter gating a `Degraded` read without permanently
/// excluding the relay, and the last successful event timestamp.
#[derive(Debug, Clone)]
pub struct RelayDiagnostics {
    pub state: SubscriptionState,
    pub consecutive_failures: u32,
    pub last_event_at: Option<i64>,
    pub degraded: bool,
}

impl Default for RelayDiagnostics {
    fn default() -> Self {
        Self {
            state: SubscriptionState::Initial,
            consecutive_failures: 0,
            last_event_at: None,
            degraded: false,
        }
    }
}

/// Threshold of consecutive failures past which a relay is marked
/// `degraded` for diagnostics; it still retries at the capped backoff
/// interval forever (spec §B.2: "other relays unaffected").
const DEGRADED_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Default)]
pub struct RelayRegistry {
    relays: HashMap<String, RelayDiagnostics>,
}

impl RelayRegistry {
    pub fn record_success(&mut self, relay_url: &str, event_created_at: i64) {
        let entry = self.relays.entry(relay_url.to_string()).or_default();
        entry.state = SubscriptionState::Live;
        entry.consecutive_failures = 0;
        entry.degraded = false;
        entry.last_event_at = Some(entry.last_event_at.map_or(event_created_at, |p| p.max(event_created_at)));
    }

    pub fn record_transition(&mut self, relay_url: &str, state: SubscriptionState) {
        self.relays.entry(relay_url.to_string()).or_default().state = state;
    }

    pub fn record_failure(&mut self, relay_url: &str) -> Duration {
        let entry = self.relays.entry(relay_url.to_string()).or_default();
        entry.state = SubscriptionState::Backoff;
        entry.consecutive_failures += 1;
        entry.degraded = entry.consecutive_failures >= DEGRADED_THRESHOLD;
        let idx = (entry.consecutive_failures as usize - 1).min(BACKOFF_SEQUENCE_SECONDS.len() - 1);
        Duration::from_secs(BACKOFF_SEQUENCE_SECONDS[idx])
    }

    pub fn snapshot(&self) -> HashMap<String, RelayDiagnostics> {
        self.relays.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_last_entry() {
        let mut registry = RelayRegistry::default();
        for _ in 0..10 {
            registry.record_failure("wss://flaky.example");
        }
        let last = registry.record_failure("wss://flaky.example");
        assert_eq!(last, Duration::from_secs(*BACKOFF_SEQUENCE_SECONDS.last().unwrap()));
    }

    #[test]
    fn marks_degraded_past_threshold() {
        let mut registry = RelayRegistry::default();
        for _ in 0..DEGRADED_THRESHOLD {
            registry.record_failure("wss://flaky.example");
        }
        let snapshot = registry.snapshot();
        assert!(snapshot["wss://flaky.example"].degraded);
    }

    #[test]
    fn success_clears_degradation() {
        let mut registry = RelayRegistry::default();
        for _ in 0..DEGRADED_THRESHOLD {
            registry.record_failure("wss://flaky.example");
        }
        registry.record_success("wss://flaky.example", 100);
        let snapshot = registry.snapshot();
        assert!(!snapshot["wss://flaky.example"].degraded);
        assert_eq!(snapshot["wss://flaky.example"].consecutive_failures, 0);
    }
}
