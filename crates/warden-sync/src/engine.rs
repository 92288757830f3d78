//! Sync engine (module C7): one call to [`SyncEngine::tick`] runs the
//! outbox pass, inbox pass and (on its own timer) the replaceable refresh
//! pass described in spec §4.7; [`SyncEngine::run_retention`] and
//! [`SyncEngine::run_aggregate_reconciler`] are the periodic C10/C9 jobs.
//! Actually scheduling these on a timer is left to the binary that embeds
//! this crate, the same way configuration *loading* is left out — this
//! crate fixes the jobs' semantics, not the runtime loop that calls them.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{instrument, warn};
use warden_discovery::Discovery;
use warden_filters::{batch_authors, mention_filter, outbox_filter, replaceable_refresh_filter, INBOX_KINDS};
use warden_graph::{to_graph_nodes, GraphBuilder};
use warden_net::{RelayClient, SubscriptionItem};
use warden_reconcile::{reconcile_pull, ReconcileError, StoreAdapter};
use warden_store::{Aggregate, DerivedStore, EventStore, GraphNode, StoreFilter, StoredEvent};

use crate::config::SyncConfig;
use crate::dedup::RecencyDedup;
use crate::error::{Result, SyncError};
use crate::ingest::{IngestPipeline, RetentionCallback};
use crate::state::RelayRegistry;
use crate::thread::{thread_of, Thread};

const BATCH_SIZE: usize = 500;

/// Summary of one [`SyncEngine::tick`], mainly for logging and tests.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub in_scope_authors: usize,
    pub scope_incomplete: bool,
    pub outbox_relays: usize,
    pub inbox_relays: usize,
    pub events_ingested: usize,
    pub replaceables_refreshed: usize,
}

pub struct SyncEngine {
    store: EventStore,
    derived: DerivedStore,
    net: RelayClient,
    discovery: Arc<Discovery>,
    config: SyncConfig,
    owner_pubkey: String,
    dedup: Mutex<RecencyDedup>,
    registry: Mutex<RelayRegistry>,
    ingest: IngestPipeline,
    last_replaceable_refresh: Mutex<i64>,
}

impl SyncEngine {
    /// Decodes `owner_npub` (bech32 `npub1...` or raw hex) and wires the
    /// rest of the workspace's crates into one engine.
    pub fn new(
        store: EventStore,
        derived: DerivedStore,
        net: RelayClient,
        discovery: Discovery,
        config: SyncConfig,
        owner_npub: &str,
    ) -> Result<Self> {
        let owner_pubkey = decode_owner_pubkey(owner_npub)?;
        let discovery = Arc::new(discovery);
        let ingest = IngestPipeline {
            store: store.clone(),
            derived: derived.clone(),
            discovery: discovery.clone(),
            owner_pubkey: owner_pubkey.clone(),
            graph_config: config.scope.clone(),
            retention_callback: None,
        };

        Ok(Self {
            store,
            derived,
            net,
            discovery,
            config,
            owner_pubkey,
            dedup: Mutex::new(RecencyDedup::default()),
            registry: Mutex::new(RelayRegistry::default()),
            ingest,
            last_replaceable_refresh: Mutex::new(0),
        })
    }

    pub fn owner_pubkey(&self) -> &str {
        &self.owner_pubkey
    }

    /// Installs the consumer's retention callback (spec §6.2). Intended to
    /// be called once at startup, before [`Self::tick`] runs concurrently.
    pub fn set_retention_callback(&mut self, callback: RetentionCallback) {
        self.ingest.retention_callback = Some(callback);
    }

    pub async fn query(&self, filter: StoreFilter) -> Result<Vec<StoredEvent>> {
        Ok(self.store.query(filter).await?)
    }

    pub async fn aggregates_for(&self, event_id: &str) -> Result<Option<Aggregate>> {
        Ok(self.derived.aggregate_for(event_id).await?)
    }

    pub async fn thread_of(&self, event_id: &str) -> Result<Thread> {
        thread_of(&self.store, event_id).await
    }

    /// Runs one tick of the sync loop (spec §4.7, steps 1-5).
    #[instrument(skip(self))]
    pub async fn tick(&self, now: i64) -> Result<TickReport> {
        let mut report = TickReport::default();

        let builder = GraphBuilder::new(&self.store);
        let scope = builder.build(&self.owner_pubkey, &self.config.scope).await;
        self.derived.clear_graph(&self.owner_pubkey).await?;
        for node in to_graph_nodes(&scope, now) {
            self.derived.upsert_graph_node(&self.owner_pubkey, node).await?;
        }
        report.in_scope_authors = scope.authors.len();
        report.scope_incomplete = scope.incomplete;
        let authors: Vec<String> = scope.authors.iter().map(|(pubkey, _, _)| pubkey.clone()).collect();

        let mut relay_to_authors: HashMap<String, Vec<String>> = HashMap::new();
        for author in &authors {
            match self.discovery.outbox_relays(author).await {
                Ok(relays) => {
                    for relay in relays {
                        relay_to_authors.entry(relay).or_default().push(author.clone());
                    }
                }
                Err(e) => warn!(error = %e, author = %author, "outbox relay resolution failed"),
            }
        }
        report.outbox_relays = relay_to_authors.len();

        for (relay, relay_authors) in &relay_to_authors {
            match self.sync_relay_outbox(relay, relay_authors, now).await {
                Ok(n) => report.events_ingested += n,
                Err(e) => {
                    self.registry.lock().await.record_failure(relay);
                    warn!(error = %e, relay = %relay, "outbox pass failed for relay");
                }
            }
        }

        if self.config.include_direct_mentions {
            match self.discovery.inbox_relays(&self.owner_pubkey).await {
                Ok(inbox_relays) => {
                    report.inbox_relays = inbox_relays.len();
                    for relay in &inbox_relays {
                        match self.sync_relay_inbox(relay).await {
                            Ok(n) => report.events_ingested += n,
                            Err(e) => {
                                self.registry.lock().await.record_failure(relay);
                                warn!(error = %e, relay = %relay, "inbox pass failed for relay");
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "inbox relay resolution failed"),
            }
        }

        {
            let mut last = self.last_replaceable_refresh.lock().await;
            if now - *last >= self.config.replaceable_refresh_interval_seconds as i64 {
                match self.refresh_replaceables(&relay_to_authors).await {
                    Ok(n) => report.replaceables_refreshed = n,
                    Err(e) => warn!(error = %e, "replaceable refresh pass failed"),
                }
                *last = now;
            }
        }

        Ok(report)
    }

    /// Runs the C10 retention engine: the keep-days floor, then (if
    /// configured) the rule engine and storage caps.
    #[instrument(skip(self))]
    pub async fn run_retention(&self, now: i64) -> Result<u64> {
        let mut deleted = 0u64;

        if let Some(keep_days) = self.config.retention.keep_days {
            deleted += warden_retention::simple_prune(&self.store, &self.derived, keep_days, now).await?;
        }

        if let Some(advanced) = &self.config.retention.advanced {
            let graph: HashMap<String, GraphNode> = self
                .derived
                .graph_nodes_for(&self.owner_pubkey)
                .await?
                .into_iter()
                .map(|node| (node.pubkey.clone(), node))
                .collect();
            let ctx = warden_retention::EvalContext { owner_pubkey: &self.owner_pubkey, graph: &graph, now };
            deleted += warden_retention::apply_rules(&self.store, &self.derived, &advanced.rules, &ctx).await?;
            deleted += warden_retention::enforce_caps(&self.store, &self.derived, &advanced.caps, &ctx).await?;
        }

        Ok(deleted)
    }

    /// Runs the C9 periodic aggregate reconciler over events with any
    /// recorded interaction since `since`.
    #[instrument(skip(self))]
    pub async fn run_aggregate_reconciler(&self, since: i64) -> Result<usize> {
        Ok(warden_aggregate::reconcile_recent(&self.store, &self.derived, since).await?)
    }

    async fn min_cursor(&self, relay: &str, kinds: &[u64]) -> Result<i64> {
        let mut min = None;
        for kind in kinds {
            let cursor = self.derived.cursor(relay, *kind).await?;
            min = Some(min.map_or(cursor, |m: i64| m.min(cursor)));
        }
        Ok(min.unwrap_or(0))
    }

    async fn sync_relay_outbox(&self, relay: &str, authors: &[String], now: i64) -> Result<usize> {
        let since = self.min_cursor(relay, &self.config.kinds).await?;
        let reconciliation_enabled = self.config.performance.use_reconciliation
            && self.discovery.capability(relay, now).await?.supports_reconciliation;

        let mut total = 0usize;
        for batch in batch_authors(authors, BATCH_SIZE) {
            let filter = outbox_filter(&batch, &self.config.kinds, since);

            if reconciliation_enabled {
                match self.try_reconcile(relay, filter.clone()).await {
                    Ok(pulled) => {
                        for event in pulled {
                            self.ingest.ingest(relay, event).await?;
                            total += 1;
                        }
                        continue;
                    }
                    Err(ReconcileError::UnsupportedByPeer(msg)) => {
                        warn!(relay = %relay, message = %msg, "relay does not support reconciliation, downgrading");
                        self.discovery.downgrade_capability(relay, now).await?;
                        if !self.config.performance.reconciliation_fallback {
                            continue;
                        }
                    }
                    Err(e) => return Err(SyncError::Reconcile(e)),
                }
            }

            total += self.stream_filter(relay, filter).await?;
        }

        Ok(total)
    }

    async fn sync_relay_inbox(&self, relay: &str) -> Result<usize> {
        let since = self.min_cursor(relay, &INBOX_KINDS).await?;
        let filter = mention_filter(&self.owner_pubkey, since);
        self.stream_filter(relay, filter).await
    }

    async fn try_reconcile(&self, relay: &str, filter: StoreFilter) -> std::result::Result<Vec<StoredEvent>, ReconcileError> {
        let pool = self.net.reconciliation_pool(relay).await.map_err(ReconcileError::from)?;
        let adapter = StoreAdapter::new(&self.store);
        let outcome =
            reconcile_pull(&pool, &adapter, relay, filter, self.config.reconciliation_round_timeout()).await?;
        Ok(outcome.pulled)
    }

    /// Opens a subscription, ingests events until end-of-stored-events or
    /// the backfill deadline, then closes it. The live phase beyond EOSE —
    /// holding the subscription open across ticks — is the scheduling
    /// binary's concern, not this crate's (see module doc).
    async fn stream_filter(&self, relay: &str, filter: StoreFilter) -> Result<usize> {
        let mut subscription = self.net.subscribe(relay, filter).await?;
        let mut count = 0usize;
        let deadline = tokio::time::Instant::now() + self.config.backfill_timeout();

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, subscription.recv()).await {
                Ok(Some(SubscriptionItem::Event(event))) => {
                    if self.should_ingest(&event.id).await {
                        self.registry.lock().await.record_success(relay, event.created_at);
                        self.ingest.ingest(relay, event).await?;
                        count += 1;
                    }
                }
                Ok(Some(SubscriptionItem::Eose)) | Ok(None) | Err(_) => break,
            }
        }

        subscription.cancel().await;
        Ok(count)
    }

    async fn refresh_replaceables(&self, relay_to_authors: &HashMap<String, Vec<String>>) -> Result<usize> {
        let mut total = 0usize;
        for (relay, authors) in relay_to_authors {
            for batch in batch_authors(authors, BATCH_SIZE) {
                let filter = replaceable_refresh_filter(&batch);
                let events = match self.net.fetch(relay, filter, self.config.backfill_timeout()).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, relay = %relay, "replaceable refresh fetch failed");
                        continue;
                    }
                };
                for event in events {
                    if self.should_ingest(&event.id).await {
                        self.ingest.ingest(relay, event).await?;
                        total += 1;
                    }
                }
            }
        }
        Ok(total)
    }

    async fn should_ingest(&self, id: &str) -> bool {
        self.dedup.lock().await.observe(id)
    }
}

fn decode_owner_pubkey(npub: &str) -> Result<String> {
    nostr::PublicKey::parse(npub)
        .map(|pk| pk.to_hex())
        .map_err(|e| SyncError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_discovery::DiscoveryConfig;

    #[tokio::test]
    async fn rejects_invalid_owner_npub() {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let discovery = Discovery::new(store.clone(), derived.clone(), RelayClient::new(), DiscoveryConfig::default(), vec![]);
        let err = SyncEngine::new(store, derived, RelayClient::new(), discovery, SyncConfig::default(), "not-an-npub").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[tokio::test]
    async fn tick_with_empty_graph_still_runs_both_passes() {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let discovery = Discovery::new(
            store.clone(),
            derived.clone(),
            RelayClient::new(),
            DiscoveryConfig::default(),
            vec!["wss://seed.example".to_string()],
        );
        let owner = "f".repeat(64);
        let engine = SyncEngine::new(store, derived, RelayClient::new(), discovery, SyncConfig::default(), &owner).unwrap();

        // No seeds resolve any hints yet for this owner (fallback_to_seeds
        // still returns the seed, but the relay is unreachable in this
        // unit test); the tick should complete and report an empty scope
        // plus attempted relay passes rather than erroring out.
        let report = engine.tick(1_000).await.unwrap();
        assert_eq!(report.in_scope_authors, 1);
        assert_eq!(report.outbox_relays, 1);
    }
}
