//! Discovery (spec §4.4, module C4).

use std::time::Duration;

use tracing::{instrument, warn};
use warden_net::RelayClient;
use warden_store::{Capability, DerivedStore, EventStore, PutOutcome, RelayHint, StoreFilter};

use crate::config::{DiscoveryConfig, CAPABILITY_CACHE_SECONDS, RECONCILIATION_NIP};
use crate::error::{DiscoveryError, Result};

const KIND_METADATA: u64 = 0;
const KIND_CONTACTS: u64 = 3;
const KIND_RELAY_LIST: u64 = 10002;

pub struct Discovery {
    store: EventStore,
    derived: DerivedStore,
    net: RelayClient,
    config: DiscoveryConfig,
    seeds: Vec<String>,
}

impl Discovery {
    pub fn new(store: EventStore, derived: DerivedStore, net: RelayClient, config: DiscoveryConfig, seeds: Vec<String>) -> Self {
        Self {
            store,
            derived,
            net,
            config,
            seeds,
        }
    }

    /// Fetches the owner's kind-0/3/10002 from the seed set in parallel,
    /// stores them, and derives relay hints from the kind-10002. Fails with
    /// a typed error (no writes) if seeds are empty.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self, owner: &str, timeout: Duration) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(DiscoveryError::BootstrapFailed);
        }

        let filter = StoreFilter::new()
            .author(owner)
            .kinds([KIND_METADATA, KIND_CONTACTS, KIND_RELAY_LIST]);

        let mut any_succeeded = false;
        for seed in &self.seeds {
            match self.net.fetch(seed, filter.clone(), timeout).await {
                Ok(events) => {
                    any_succeeded = true;
                    for event in events {
                        if event.kind == KIND_RELAY_LIST {
                            self.apply_relay_list(&event).await?;
                        }
                        if let Err(e) = self.store.put_event(event).await {
                            warn!(error = %e, relay = %seed, "failed to store bootstrap event");
                        }
                    }
                }
                Err(e) => warn!(error = %e, relay = %seed, "seed relay unreachable during bootstrap"),
            }
        }

        if !any_succeeded {
            return Err(DiscoveryError::BootstrapFailed);
        }
        Ok(())
    }

    /// Write-marked relays; falls back to read-marked, then seeds.
    #[instrument(skip(self))]
    pub async fn outbox_relays(&self, pubkey: &str) -> Result<Vec<String>> {
        let hints = self.derived.relay_hints_for(pubkey).await?;
        let write: Vec<String> = hints.iter().filter(|h| h.can_write).map(|h| h.relay_url.clone()).collect();
        if !write.is_empty() {
            return Ok(write);
        }
        let read: Vec<String> = hints.iter().filter(|h| h.can_read).map(|h| h.relay_url.clone()).collect();
        if !read.is_empty() {
            return Ok(read);
        }
        Ok(if self.config.fallback_to_seeds { self.seeds.clone() } else { Vec::new() })
    }

    /// Read-marked relays; falls back to write-marked, then seeds. The
    /// asymmetry with [`Self::outbox_relays`] is load-bearing (spec §4.4).
    #[instrument(skip(self))]
    pub async fn inbox_relays(&self, pubkey: &str) -> Result<Vec<String>> {
        let hints = self.derived.relay_hints_for(pubkey).await?;
        let read: Vec<String> = hints.iter().filter(|h| h.can_read).map(|h| h.relay_url.clone()).collect();
        if !read.is_empty() {
            return Ok(read);
        }
        let write: Vec<String> = hints.iter().filter(|h| h.can_write).map(|h| h.relay_url.clone()).collect();
        if !write.is_empty() {
            return Ok(write);
        }
        Ok(if self.config.fallback_to_seeds { self.seeds.clone() } else { Vec::new() })
    }

    /// Fetches kind-10002 for each pubkey from `source_relays`, deduplicates
    /// across relays (freshest kind-10002 per author wins), and caps hint
    /// fan-out per author to `max_relays_per_author`.
    #[instrument(skip(self, pubkeys, source_relays))]
    pub async fn discover_hints(&self, pubkeys: &[String], source_relays: &[String], timeout: Duration) -> Result<()> {
        if !self.config.use_author_hints {
            return Ok(());
        }
        for pubkey in pubkeys {
            let filter = StoreFilter::new().author(pubkey.clone()).kind(KIND_RELAY_LIST);
            let mut best: Option<warden_store::StoredEvent> = None;
            for relay in source_relays {
                let events = match self.net.fetch(relay, filter.clone(), timeout).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, relay = %relay, pubkey = %pubkey, "hint discovery fetch failed");
                        continue;
                    }
                };
                for event in events {
                    if best.as_ref().map(|b| event.created_at > b.created_at).unwrap_or(true) {
                        best = Some(event);
                    }
                }
            }
            if let Some(event) = best {
                if matches!(self.store.put_event(event.clone()).await?, PutOutcome::Stored) {
                    self.apply_relay_list(&event).await?;
                }
            }
        }
        Ok(())
    }

    /// Derives relay hints from a freshly-ingested kind-10002 event. Public
    /// entry point for the sync engine's ingest pipeline, distinct from the
    /// bootstrap/discover_hints call sites which fetch the event themselves.
    pub async fn ingest_relay_list(&self, event: &warden_store::StoredEvent) -> Result<()> {
        self.apply_relay_list(event).await
    }

    async fn apply_relay_list(&self, event: &warden_store::StoredEvent) -> Result<()> {
        let mut count = 0usize;
        for tag in &event.tags {
            if count >= self.config.max_relays_per_author {
                break;
            }
            if tag.first().map(String::as_str) != Some("r") {
                continue;
            }
            let Some(relay_url) = tag.get(1) else { continue };
            let marker = tag.get(2).map(String::as_str);
            let (can_read, can_write) = match marker {
                Some("read") => (true, false),
                Some("write") => (false, true),
                _ => (true, true),
            };
            self.derived
                .upsert_relay_hint(RelayHint {
                    pubkey: event.pubkey.clone(),
                    relay_url: relay_url.clone(),
                    can_read,
                    can_write,
                    freshness: event.created_at,
                })
                .await?;
            count += 1;
        }
        Ok(())
    }

    /// Returns a cached, still-valid capability record, or re-fetches the
    /// NIP-11 document. Conservative default: an unreachable or silent
    /// document is treated as unsupporting (spec §4.4).
    #[instrument(skip(self))]
    pub async fn capability(&self, relay_url: &str, now: i64) -> Result<Capability> {
        if let Some(cached) = self.derived.capability(relay_url).await? {
            if cached.check_expiry > now {
                return Ok(cached);
            }
        }

        let (supports, software, version) = match self.net.request_capability_document(relay_url).await {
            Ok(doc) => (doc.supports(RECONCILIATION_NIP), doc.software, doc.version),
            Err(e) => {
                warn!(error = %e, relay = %relay_url, "capability document unreachable, assuming unsupported");
                (false, None, None)
            }
        };

        let cap = Capability {
            relay_url: relay_url.to_string(),
            supports_reconciliation: supports,
            software,
            version,
            last_checked: now,
            check_expiry: now + CAPABILITY_CACHE_SECONDS,
        };
        self.derived.upsert_capability(cap.clone()).await?;
        Ok(cap)
    }

    /// A runtime reconciliation failure downgrades the cached flag
    /// immediately, independent of the cache expiry (spec §4.4).
    #[instrument(skip(self))]
    pub async fn downgrade_capability(&self, relay_url: &str, now: i64) -> Result<()> {
        let mut cap = self
            .derived
            .capability(relay_url)
            .await?
            .unwrap_or(Capability {
                relay_url: relay_url.to_string(),
                supports_reconciliation: false,
                software: None,
                version: None,
                last_checked: now,
                check_expiry: now + CAPABILITY_CACHE_SECONDS,
            });
        cap.supports_reconciliation = false;
        cap.last_checked = now;
        self.derived.upsert_capability(cap).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_discovery(seeds: Vec<String>) -> Discovery {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        Discovery::new(store, derived, RelayClient::new(), DiscoveryConfig::default(), seeds)
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_empty_seeds() {
        let discovery = new_discovery(vec![]).await;
        let err = discovery.bootstrap("pk1", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::BootstrapFailed));
    }

    #[tokio::test]
    async fn outbox_falls_back_to_seeds_with_no_hints() {
        let seeds = vec!["wss://seed.example".to_string()];
        let discovery = new_discovery(seeds.clone()).await;
        assert_eq!(discovery.outbox_relays("pk1").await.unwrap(), seeds);
    }

    #[tokio::test]
    async fn outbox_and_inbox_are_asymmetric() {
        let discovery = new_discovery(vec![]).await;
        discovery
            .derived
            .upsert_relay_hint(RelayHint {
                pubkey: "pk1".into(),
                relay_url: "wss://read-only.example".into(),
                can_read: true,
                can_write: false,
                freshness: 100,
            })
            .await
            .unwrap();

        assert!(discovery.outbox_relays("pk1").await.unwrap().is_empty());
        assert_eq!(discovery.inbox_relays("pk1").await.unwrap(), vec!["wss://read-only.example".to_string()]);
    }
}
