//! Derived-state store (spec §4.2, module C2): interaction aggregates,
//! relay hints, graph membership, sync cursors, relay capability cache and
//! retention bookkeeping. All writes here are idempotent upserts driven off
//! the ingest pipeline or the periodic reconciler in `warden-aggregate`.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::Result;
use crate::pool::SqlitePool;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub event_id: String,
    pub reply_count: u64,
    pub reaction_total: u64,
    pub reaction_counts: HashMap<String, u64>,
    pub zap_sats_total: u64,
    pub last_interaction_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayHint {
    pub pubkey: String,
    pub relay_url: String,
    pub can_read: bool,
    pub can_write: bool,
    pub freshness: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub pubkey: String,
    pub depth: u32,
    pub mutual: bool,
    pub last_seen: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub relay_url: String,
    pub supports_reconciliation: bool,
    pub software: Option<String>,
    pub version: Option<String>,
    pub last_checked: i64,
    pub check_expiry: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionDecision {
    pub event_id: String,
    pub rule_name: String,
    pub priority: i64,
    pub retain_until: Option<i64>,
    pub score: i64,
    pub protected: bool,
    pub last_evaluated_at: i64,
}

#[derive(Debug, Clone)]
pub struct DerivedStore {
    pool: SqlitePool,
}

impl DerivedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn increment_reply(&self, event_id: &str, at: i64) -> Result<()> {
        let event_id = event_id.to_string();
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            ensure_aggregate_row(conn, &event_id)?;
            conn.execute(
                "UPDATE aggregates SET reply_count = reply_count + 1,
                 last_interaction_at = MAX(last_interaction_at, ?2)
                 WHERE event_id = ?1",
                params![event_id, at],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn increment_reaction(&self, event_id: &str, emoji: &str, at: i64) -> Result<()> {
        let event_id = event_id.to_string();
        let emoji = emoji.to_string();
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            ensure_aggregate_row(conn, &event_id)?;
            let raw: String = conn.query_row(
                "SELECT reaction_counts_json FROM aggregates WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )?;
            let mut counts: HashMap<String, u64> =
                serde_json::from_str(&raw).unwrap_or_default();
            *counts.entry(emoji).or_insert(0) += 1;
            let updated =
                serde_json::to_string(&counts).expect("HashMap<String, u64> always serializes");

            conn.execute(
                "UPDATE aggregates SET reaction_total = reaction_total + 1,
                 reaction_counts_json = ?2,
                 last_interaction_at = MAX(last_interaction_at, ?3)
                 WHERE event_id = ?1",
                params![event_id, updated, at],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn add_zap(&self, event_id: &str, sats: u64, at: i64) -> Result<()> {
        let event_id = event_id.to_string();
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            ensure_aggregate_row(conn, &event_id)?;
            conn.execute(
                "UPDATE aggregates SET zap_sats_total = zap_sats_total + ?2,
                 last_interaction_at = MAX(last_interaction_at, ?3)
                 WHERE event_id = ?1",
                params![event_id, sats as i64, at],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    /// Overwrites an aggregate row wholesale. Used by the periodic
    /// reconciler in `warden-aggregate` when incremental updates have
    /// drifted from a recount over raw events.
    pub async fn replace_aggregate(&self, aggregate: Aggregate) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            let counts_json = serde_json::to_string(&aggregate.reaction_counts)
                .expect("HashMap<String, u64> always serializes");
            conn.execute(
                "INSERT INTO aggregates (event_id, reply_count, reaction_total, reaction_counts_json, zap_sats_total, last_interaction_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (event_id) DO UPDATE SET
                    reply_count = excluded.reply_count,
                    reaction_total = excluded.reaction_total,
                    reaction_counts_json = excluded.reaction_counts_json,
                    zap_sats_total = excluded.zap_sats_total,
                    last_interaction_at = excluded.last_interaction_at",
                params![
                    aggregate.event_id,
                    aggregate.reply_count as i64,
                    aggregate.reaction_total as i64,
                    counts_json,
                    aggregate.zap_sats_total as i64,
                    aggregate.last_interaction_at,
                ],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn aggregate_for(&self, event_id: &str) -> Result<Option<Aggregate>> {
        let event_id = event_id.to_string();
        let conn = self.pool.acquire().await?;
        let row = conn
            .interact(move |conn: &mut Connection| {
                conn.query_row(
                    "SELECT event_id, reply_count, reaction_total, reaction_counts_json, zap_sats_total, last_interaction_at
                     FROM aggregates WHERE event_id = ?1",
                    params![event_id],
                    |row| {
                        let counts_raw: String = row.get(3)?;
                        Ok(Aggregate {
                            event_id: row.get(0)?,
                            reply_count: row.get::<_, i64>(1)? as u64,
                            reaction_total: row.get::<_, i64>(2)? as u64,
                            reaction_counts: serde_json::from_str(&counts_raw).unwrap_or_default(),
                            zap_sats_total: row.get::<_, i64>(4)? as u64,
                            last_interaction_at: row.get(5)?,
                        })
                    },
                )
                .optional()
            })
            .await??;
        Ok(row)
    }

    /// Event ids whose aggregate has seen interaction since `since`. Feeds
    /// the periodic reconciler's recompute sample (spec §4.9).
    pub async fn aggregate_ids_since(&self, since: i64) -> Result<Vec<String>> {
        let conn = self.pool.acquire().await?;
        let ids = conn
            .interact(move |conn: &mut Connection| {
                let mut stmt = conn.prepare(
                    "SELECT event_id FROM aggregates WHERE last_interaction_at >= ?1",
                )?;
                let rows = stmt.query_map(params![since], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<String>>>()
            })
            .await??;
        Ok(ids)
    }

    /// Inserts or refreshes a relay hint. A hint only overwrites an existing
    /// one when it is at least as fresh (spec §4.4: freshest NIP-65 wins).
    pub async fn upsert_relay_hint(&self, hint: RelayHint) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            conn.execute(
                "INSERT INTO relay_hints (pubkey, relay_url, can_read, can_write, freshness)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (pubkey, relay_url) DO UPDATE SET
                    can_read = excluded.can_read,
                    can_write = excluded.can_write,
                    freshness = excluded.freshness
                 WHERE excluded.freshness >= relay_hints.freshness",
                params![hint.pubkey, hint.relay_url, hint.can_read, hint.can_write, hint.freshness],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn relay_hints_for(&self, pubkey: &str) -> Result<Vec<RelayHint>> {
        let pubkey = pubkey.to_string();
        let conn = self.pool.acquire().await?;
        let hints = conn
            .interact(move |conn: &mut Connection| {
                let mut stmt = conn.prepare(
                    "SELECT pubkey, relay_url, can_read, can_write, freshness
                     FROM relay_hints WHERE pubkey = ?1 ORDER BY freshness DESC",
                )?;
                let rows = stmt.query_map(params![pubkey], |row| {
                    Ok(RelayHint {
                        pubkey: row.get(0)?,
                        relay_url: row.get(1)?,
                        can_read: row.get(2)?,
                        can_write: row.get(3)?,
                        freshness: row.get(4)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await??;
        Ok(hints)
    }

    pub async fn clear_graph(&self, owner_pubkey: &str) -> Result<()> {
        let owner_pubkey = owner_pubkey.to_string();
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            conn.execute("DELETE FROM graph_nodes WHERE owner_pubkey = ?1", params![owner_pubkey])
        })
        .await??;
        Ok(())
    }

    pub async fn upsert_graph_node(&self, owner_pubkey: &str, node: GraphNode) -> Result<()> {
        let owner_pubkey = owner_pubkey.to_string();
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            conn.execute(
                "INSERT INTO graph_nodes (owner_pubkey, pubkey, depth, mutual, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (owner_pubkey, pubkey) DO UPDATE SET
                    depth = excluded.depth,
                    mutual = excluded.mutual,
                    last_seen = excluded.last_seen",
                params![owner_pubkey, node.pubkey, node.depth, node.mutual, node.last_seen],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn graph_nodes_for(&self, owner_pubkey: &str) -> Result<Vec<GraphNode>> {
        let owner_pubkey = owner_pubkey.to_string();
        let conn = self.pool.acquire().await?;
        let nodes = conn
            .interact(move |conn: &mut Connection| {
                let mut stmt = conn.prepare(
                    "SELECT pubkey, depth, mutual, last_seen FROM graph_nodes WHERE owner_pubkey = ?1",
                )?;
                let rows = stmt.query_map(params![owner_pubkey], |row| {
                    Ok(GraphNode {
                        pubkey: row.get(0)?,
                        depth: row.get(1)?,
                        mutual: row.get(2)?,
                        last_seen: row.get(3)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await??;
        Ok(nodes)
    }

    pub async fn cursor(&self, relay_url: &str, kind: u64) -> Result<i64> {
        let relay_url = relay_url.to_string();
        let conn = self.pool.acquire().await?;
        let since = conn
            .interact(move |conn: &mut Connection| {
                conn.query_row(
                    "SELECT since FROM cursors WHERE relay_url = ?1 AND kind = ?2",
                    params![relay_url, kind as i64],
                    |row| row.get(0),
                )
                .optional()
            })
            .await??;
        Ok(since.unwrap_or(0))
    }

    /// Advances a per-relay, per-kind cursor. Never moves it backwards.
    pub async fn advance_cursor(&self, relay_url: &str, kind: u64, since: i64) -> Result<()> {
        let relay_url = relay_url.to_string();
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            conn.execute(
                "INSERT INTO cursors (relay_url, kind, since) VALUES (?1, ?2, ?3)
                 ON CONFLICT (relay_url, kind) DO UPDATE SET since = MAX(since, excluded.since)",
                params![relay_url, kind as i64, since],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn capability(&self, relay_url: &str) -> Result<Option<Capability>> {
        let relay_url = relay_url.to_string();
        let conn = self.pool.acquire().await?;
        let cap = conn
            .interact(move |conn: &mut Connection| {
                conn.query_row(
                    "SELECT relay_url, supports_reconciliation, software, version, last_checked, check_expiry
                     FROM capabilities WHERE relay_url = ?1",
                    params![relay_url],
                    |row| {
                        Ok(Capability {
                            relay_url: row.get(0)?,
                            supports_reconciliation: row.get(1)?,
                            software: row.get(2)?,
                            version: row.get(3)?,
                            last_checked: row.get(4)?,
                            check_expiry: row.get(5)?,
                        })
                    },
                )
                .optional()
            })
            .await??;
        Ok(cap)
    }

    pub async fn upsert_capability(&self, cap: Capability) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            conn.execute(
                "INSERT INTO capabilities (relay_url, supports_reconciliation, software, version, last_checked, check_expiry)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (relay_url) DO UPDATE SET
                    supports_reconciliation = excluded.supports_reconciliation,
                    software = excluded.software,
                    version = excluded.version,
                    last_checked = excluded.last_checked,
                    check_expiry = excluded.check_expiry",
                params![
                    cap.relay_url,
                    cap.supports_reconciliation,
                    cap.software,
                    cap.version,
                    cap.last_checked,
                    cap.check_expiry,
                ],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    pub async fn record_retention_decision(&self, decision: RetentionDecision) -> Result<()> {
        let conn = self.pool.acquire().await?;
        conn.interact(move |conn: &mut Connection| {
            conn.execute(
                "INSERT INTO retention_decisions (event_id, rule_name, priority, retain_until, score, protected, last_evaluated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (event_id) DO UPDATE SET
                    rule_name = excluded.rule_name,
                    priority = excluded.priority,
                    retain_until = excluded.retain_until,
                    score = excluded.score,
                    protected = excluded.protected,
                    last_evaluated_at = excluded.last_evaluated_at",
                params![
                    decision.event_id,
                    decision.rule_name,
                    decision.priority,
                    decision.retain_until,
                    decision.score,
                    decision.protected,
                    decision.last_evaluated_at,
                ],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    /// Ids currently flagged `protected` by the retention rule engine.
    /// Consulted by simple keep-days pruning so a rule's `protect` action
    /// always wins over the time floor (spec §4.10).
    pub async fn protected_event_ids(&self) -> Result<std::collections::HashSet<String>> {
        let conn = self.pool.acquire().await?;
        let ids = conn
            .interact(move |conn: &mut Connection| {
                let mut stmt =
                    conn.prepare("SELECT event_id FROM retention_decisions WHERE protected = 1")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<std::collections::HashSet<String>>>()
            })
            .await??;
        Ok(ids)
    }
}

fn ensure_aggregate_row(conn: &Connection, event_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO aggregates (event_id) VALUES (?1)",
        params![event_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> DerivedStore {
        let pool = SqlitePool::open_in_memory().await.unwrap();
        DerivedStore::new(pool)
    }

    #[tokio::test]
    async fn increments_reply_count() {
        let store = store().await;
        store.increment_reply("e1", 100).await.unwrap();
        store.increment_reply("e1", 200).await.unwrap();

        let agg = store.aggregate_for("e1").await.unwrap().unwrap();
        assert_eq!(agg.reply_count, 2);
        assert_eq!(agg.last_interaction_at, 200);
    }

    #[tokio::test]
    async fn tracks_reaction_breakdown() {
        let store = store().await;
        store.increment_reaction("e1", "+", 100).await.unwrap();
        store.increment_reaction("e1", "+", 150).await.unwrap();
        store.increment_reaction("e1", "🤙", 120).await.unwrap();

        let agg = store.aggregate_for("e1").await.unwrap().unwrap();
        assert_eq!(agg.reaction_total, 3);
        assert_eq!(agg.reaction_counts.get("+"), Some(&2));
        assert_eq!(agg.reaction_counts.get("🤙"), Some(&1));
    }

    #[tokio::test]
    async fn accumulates_zap_sats() {
        let store = store().await;
        store.add_zap("e1", 1000, 100).await.unwrap();
        store.add_zap("e1", 2100, 50).await.unwrap();

        let agg = store.aggregate_for("e1").await.unwrap().unwrap();
        assert_eq!(agg.zap_sats_total, 3100);
        assert_eq!(agg.last_interaction_at, 100);
    }

    #[tokio::test]
    async fn relay_hint_ignores_staler_update() {
        let store = store().await;
        store
            .upsert_relay_hint(RelayHint {
                pubkey: "pk1".into(),
                relay_url: "wss://relay.example".into(),
                can_read: true,
                can_write: true,
                freshness: 200,
            })
            .await
            .unwrap();
        store
            .upsert_relay_hint(RelayHint {
                pubkey: "pk1".into(),
                relay_url: "wss://relay.example".into(),
                can_read: false,
                can_write: false,
                freshness: 100,
            })
            .await
            .unwrap();

        let hints = store.relay_hints_for("pk1").await.unwrap();
        assert_eq!(hints.len(), 1);
        assert!(hints[0].can_read);
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let store = store().await;
        store.advance_cursor("wss://relay.example", 1, 500).await.unwrap();
        store.advance_cursor("wss://relay.example", 1, 300).await.unwrap();

        assert_eq!(store.cursor("wss://relay.example", 1).await.unwrap(), 500);
    }
}
