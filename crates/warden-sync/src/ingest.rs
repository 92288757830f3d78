//! Ingest pipeline (spec §4.7): the per-event side effects applied after
//! an event clears dedup and is persisted in the event store.

use std::sync::Arc;

use tracing::{instrument, warn};
use warden_discovery::Discovery;
use warden_graph::{to_graph_nodes, GraphBuilder, GraphConfig};
use warden_store::{DerivedStore, EventStore, PutOutcome, RetentionDecision, StoredEvent};

use crate::error::Result;

const KIND_CONTACTS: u64 = 3;
const KIND_RELAY_LIST: u64 = 10002;

/// What a consumer-installed retention callback decided about one event
/// (spec §4.10: "the retention callback may mark an event as protected").
pub enum RetentionVerdict {
    None,
    Protect,
}

pub type RetentionCallback =
    Arc<dyn Fn(&StoredEvent) -> std::result::Result<RetentionVerdict, String> + Send + Sync>;

pub struct IngestPipeline {
    pub store: EventStore,
    pub derived: DerivedStore,
    pub discovery: Arc<Discovery>,
    pub owner_pubkey: String,
    pub graph_config: GraphConfig,
    pub retention_callback: Option<RetentionCallback>,
}

impl IngestPipeline {
    /// Applies one event's full side-effect chain. `source_relay` drives
    /// cursor advancement; the event itself must already be known-new to
    /// the dedup set and already persisted or about to be persisted.
    #[instrument(skip(self, event), fields(kind = event.kind, id = %event.id))]
    pub async fn ingest(&self, source_relay: &str, event: StoredEvent) -> Result<()> {
        let outcome = self.store.put_event(event.clone()).await?;
        if outcome == PutOutcome::Duplicate {
            // Still advance the cursor: a duplicate at a newer created-at
            // than our cursor is still proof we've seen up to that point.
            self.derived.advance_cursor(source_relay, event.kind, event.created_at).await?;
            return Ok(());
        }

        if event.kind == KIND_CONTACTS && event.pubkey == self.owner_pubkey {
            self.rebuild_graph(event.created_at).await?;
        }

        if event.kind == KIND_RELAY_LIST {
            if let Err(e) = self.discovery.ingest_relay_list(&event).await {
                warn!(error = %e, event = %event.id, "failed to derive relay hints from kind-10002");
            }
        }

        warden_aggregate::apply_interaction(&self.derived, &event).await?;

        if let Some(callback) = &self.retention_callback {
            match callback(&event) {
                Ok(RetentionVerdict::Protect) => {
                    self.derived
                        .record_retention_decision(RetentionDecision {
                            event_id: event.id.clone(),
                            rule_name: "retention-callback".into(),
                            priority: i64::MAX,
                            retain_until: None,
                            score: 0,
                            protected: true,
                            last_evaluated_at: event.created_at,
                        })
                        .await?;
                }
                Ok(RetentionVerdict::None) => {}
                Err(message) => warn!(event = %event.id, %message, "retention callback failed"),
            }
        }

        self.derived.advance_cursor(source_relay, event.kind, event.created_at).await?;
        Ok(())
    }

    /// Rebuilds and persists the owner's in-scope author graph. `freshness`
    /// stamps the resulting nodes; callers pass the triggering event's
    /// `created_at` (ingest) or wall-clock (the periodic tick), keeping
    /// this crate itself clock-free.
    pub async fn rebuild_graph(&self, freshness: i64) -> Result<()> {
        let builder = GraphBuilder::new(&self.store);
        let result = builder.build(&self.owner_pubkey, &self.graph_config).await;
        self.derived.clear_graph(&self.owner_pubkey).await?;
        for node in to_graph_nodes(&result, freshness) {
            self.derived.upsert_graph_node(&self.owner_pubkey, node).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_discovery::DiscoveryConfig;
    use warden_net::RelayClient;

    fn event(id: &str, pubkey: &str, kind: u64, tags: Vec<Vec<String>>, created_at: i64) -> StoredEvent {
        StoredEvent {
            id: id.to_string(),
            pubkey: pubkey.to_string(),
            created_at,
            kind,
            tags,
            content: String::new(),
            sig: "sig".into(),
        }
    }

    async fn pipeline() -> (IngestPipeline, EventStore, DerivedStore) {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let discovery = Arc::new(Discovery::new(
            store.clone(),
            derived.clone(),
            RelayClient::new(),
            DiscoveryConfig::default(),
            vec![],
        ));
        let pipeline = IngestPipeline {
            store: store.clone(),
            derived: derived.clone(),
            discovery,
            owner_pubkey: "owner".to_string(),
            graph_config: GraphConfig::default(),
            retention_callback: None,
        };
        (pipeline, store, derived)
    }

    #[tokio::test]
    async fn reply_updates_aggregate_and_cursor() {
        let (pipeline, _, derived) = pipeline().await;
        let note = event(&"a".repeat(64), "p1", 1, vec![vec!["e".into(), "target".into()]], 1000);
        pipeline.ingest("wss://relay.example", note).await.unwrap();

        let agg = derived.aggregate_for("target").await.unwrap().unwrap();
        assert_eq!(agg.reply_count, 1);
        assert_eq!(derived.cursor("wss://relay.example", 1).await.unwrap(), 1000);
    }

    #[tokio::test]
    async fn owner_contact_list_triggers_graph_rebuild() {
        let (pipeline, _, derived) = pipeline().await;
        let contacts = event(
            &"a".repeat(64),
            "owner",
            3,
            vec![vec!["p".into(), "friend".into()]],
            1000,
        );
        pipeline.ingest("wss://relay.example", contacts).await.unwrap();

        let nodes = derived.graph_nodes_for("owner").await.unwrap();
        assert!(nodes.iter().any(|n| n.pubkey == "friend"));
    }

    #[tokio::test]
    async fn retention_callback_protect_is_recorded() {
        let (store, derived) = warden_store::open_in_memory().await.unwrap();
        let discovery = Arc::new(Discovery::new(
            store.clone(),
            derived.clone(),
            RelayClient::new(),
            DiscoveryConfig::default(),
            vec![],
        ));
        let pipeline = IngestPipeline {
            store,
            derived: derived.clone(),
            discovery,
            owner_pubkey: "owner".to_string(),
            graph_config: GraphConfig::default(),
            retention_callback: Some(Arc::new(|_event| Ok(RetentionVerdict::Protect))),
        };

        let note = event(&"a".repeat(64), "p1", 1, vec![], 1000);
        pipeline.ingest("wss://relay.example", note.clone()).await.unwrap();

        let protected = derived.protected_event_ids().await.unwrap();
        assert!(protected.contains(&note.id));
    }
}
