//! Event store (spec §4.1, module C1).

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use tracing::instrument;

use crate::domain::StoredEvent;
use crate::error::Result;
use crate::filter::StoreFilter;
use crate::pool::SqlitePool;
use crate::verify::verify_and_parse;

/// Outcome of [`EventStore::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    Duplicate,
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Verifies, deduplicates and persists a raw NIP-01 event JSON string.
    ///
    /// Replaceable and parameterized-replaceable events (kind 0/3/10002 and
    /// 30023, per spec §3) are superseded in place: an incoming event with a
    /// `created_at` older than, or tied-and-lexicographically-not-greater
    /// than, the event currently on file for the same `(kind, pubkey, d)` is
    /// treated as a duplicate rather than stored.
    #[instrument(skip_all, fields(kind, pubkey))]
    pub async fn put(&self, json: &str) -> Result<PutOutcome> {
        let event = match verify_and_parse(json) {
            Ok(event) => event,
            Err(crate::error::StoreError::Invalid(msg)) => return Ok(PutOutcome::Invalid(msg)),
            Err(e) => return Err(e),
        };
        self.put_event(event).await
    }

    /// Same as [`Self::put`] but for an already-verified event (used by the
    /// sync ingest pipeline, which verifies once up front).
    #[instrument(skip_all, fields(kind = event.kind, pubkey = %event.pubkey))]
    pub async fn put_event(&self, event: StoredEvent) -> Result<PutOutcome> {
        let conn = self.pool.acquire().await?;
        let outcome = conn
            .interact(move |conn: &mut Connection| insert_event(conn, &event))
            .await??;
        Ok(outcome)
    }

    #[instrument(skip_all)]
    pub async fn query(&self, filter: StoreFilter) -> Result<Vec<StoredEvent>> {
        let conn = self.pool.acquire().await?;
        let events = conn
            .interact(move |conn: &mut Connection| run_query(conn, &filter))
            .await??;
        Ok(events)
    }

    pub async fn count(&self, filter: StoreFilter) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let count = conn
            .interact(move |conn: &mut Connection| run_count(conn, &filter))
            .await??;
        Ok(count)
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let conn = self.pool.acquire().await?;
        let deleted = conn
            .interact(move |conn: &mut Connection| {
                let n = conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
                Ok::<_, rusqlite::Error>(n > 0)
            })
            .await??;
        Ok(deleted)
    }

    /// Deletes every event matching `filter`, returning the number removed.
    /// Used by retention (C10) to carry out prune decisions.
    pub async fn delete_where(&self, filter: StoreFilter) -> Result<u64> {
        let conn = self.pool.acquire().await?;
        let deleted = conn
            .interact(move |conn: &mut Connection| run_delete(conn, &filter))
            .await??;
        Ok(deleted)
    }
}

fn insert_event(conn: &mut Connection, event: &StoredEvent) -> rusqlite::Result<PutOutcome> {
    let tx = conn.transaction()?;

    if event.is_replaceable() || event.is_parameterized_replaceable() {
        let d = event.d_tag();
        let existing: Option<(String, i64)> = tx
            .query_row(
                "SELECT id, created_at FROM events WHERE kind = ?1 AND pubkey = ?2 AND d_tag IS ?3",
                params![event.kind as i64, event.pubkey, d],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((existing_id, existing_created_at)) = existing {
            let superseded = event.created_at > existing_created_at
                || (event.created_at == existing_created_at && event.id > existing_id);
            if !superseded {
                return Ok(PutOutcome::Duplicate);
            }
            tx.execute("DELETE FROM events WHERE id = ?1", params![existing_id])?;
        }
    } else {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = ?1)",
            params![event.id],
            |row| row.get(0),
        )?;
        if exists {
            return Ok(PutOutcome::Duplicate);
        }
    }

    let tags_json = serde_json::to_string(&event.tags)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    tx.execute(
        "INSERT INTO events (id, pubkey, kind, created_at, content, tags_json, sig, d_tag)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.id,
            event.pubkey,
            event.kind as i64,
            event.created_at,
            event.content,
            tags_json,
            event.sig,
            event.d_tag(),
        ],
    )?;

    for tag in &event.tags {
        if tag.len() < 2 {
            continue;
        }
        tx.execute(
            "INSERT INTO event_tags (event_id, tag_name, tag_value, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![event.id, tag[0], tag[1], event.created_at],
        )?;
    }

    tx.commit()?;
    Ok(PutOutcome::Stored)
}

/// Shared WHERE-clause builder for query/count/delete. Tag filters are
/// expressed as `EXISTS` subqueries against `event_tags`; search is a
/// simple substring match applied alongside the structural predicates
/// (spec §4.1: search narrows within, it never substitutes for, the
/// structural filter).
fn build_where(filter: &StoreFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    if !filter.ids.is_empty() {
        let placeholders = vec!["?"; filter.ids.len()].join(", ");
        clauses.push(format!("id IN ({placeholders})"));
        for id in &filter.ids {
            params.push(Box::new(id.clone()));
        }
    }

    if !filter.authors.is_empty() {
        let placeholders = vec!["?"; filter.authors.len()].join(", ");
        clauses.push(format!("pubkey IN ({placeholders})"));
        for author in &filter.authors {
            params.push(Box::new(author.clone()));
        }
    }

    if !filter.kinds.is_empty() {
        let placeholders = vec!["?"; filter.kinds.len()].join(", ");
        clauses.push(format!("kind IN ({placeholders})"));
        for kind in &filter.kinds {
            params.push(Box::new(*kind as i64));
        }
    }

    if let Some(since) = filter.since {
        clauses.push("created_at >= ?".to_string());
        params.push(Box::new(since));
    }

    if let Some(until) = filter.until {
        clauses.push("created_at <= ?".to_string());
        params.push(Box::new(until));
    }

    for (name, values) in &filter.tags {
        if values.is_empty() {
            continue;
        }
        let placeholders = vec!["?"; values.len()].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM event_tags et WHERE et.event_id = events.id AND et.tag_name = ? AND et.tag_value IN ({placeholders}))"
        ));
        params.push(Box::new(name.clone()));
        for value in values {
            params.push(Box::new(value.clone()));
        }
    }

    if let Some(term) = &filter.search {
        clauses.push("content LIKE ? ESCAPE '\\'".to_string());
        params.push(Box::new(format!("%{}%", escape_like(term))));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (where_sql, params)
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn run_query(conn: &Connection, filter: &StoreFilter) -> rusqlite::Result<Vec<StoredEvent>> {
    let (where_sql, mut params) = build_where(filter);
    let mut sql = format!(
        "SELECT id, pubkey, created_at, kind, tags_json, content, sig FROM events {where_sql} ORDER BY created_at DESC, id DESC"
    );
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params.push(Box::new(limit as i64));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter().map(|p| p.as_ref())), |row| {
        let tags_json: String = row.get(4)?;
        let tags: Vec<Vec<String>> = serde_json::from_str(&tags_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;
        Ok(StoredEvent {
            id: row.get(0)?,
            pubkey: row.get(1)?,
            created_at: row.get(2)?,
            kind: row.get::<_, i64>(3)? as u64,
            tags,
            content: row.get(5)?,
            sig: row.get(6)?,
        })
    })?;

    rows.collect()
}

fn run_count(conn: &Connection, filter: &StoreFilter) -> rusqlite::Result<u64> {
    let (where_sql, params) = build_where(filter);
    let sql = format!("SELECT COUNT(*) FROM events {where_sql}");
    let mut stmt = conn.prepare(&sql)?;
    let count: i64 = stmt.query_row(params_from_iter(params.iter().map(|p| p.as_ref())), |row| row.get(0))?;
    Ok(count as u64)
}

fn run_delete(conn: &Connection, filter: &StoreFilter) -> rusqlite::Result<u64> {
    let (where_sql, params) = build_where(filter);
    let sql = format!("DELETE FROM events {where_sql}");
    let n = conn.execute(&sql, params_from_iter(params.iter().map(|p| p.as_ref())))?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(id: &str, kind: u64, created_at: i64) -> StoredEvent {
        StoredEvent {
            id: id.to_string(),
            pubkey: "pk1".to_string(),
            created_at,
            kind,
            tags: vec![],
            content: "hello world".to_string(),
            sig: "sig".to_string(),
        }
    }

    async fn store() -> EventStore {
        let pool = SqlitePool::open_in_memory().await.unwrap();
        EventStore::new(pool)
    }

    #[tokio::test]
    async fn stores_and_dedups_regular_events() {
        let store = store().await;
        let event = sample_event("a".repeat(64).as_str(), 1, 1000);

        assert_eq!(store.put_event(event.clone()).await.unwrap(), PutOutcome::Stored);
        assert_eq!(store.put_event(event).await.unwrap(), PutOutcome::Duplicate);
    }

    #[tokio::test]
    async fn supersedes_replaceable_event() {
        let store = store().await;
        let older = sample_event("a".repeat(64).as_str(), 0, 1000);
        let newer = sample_event("b".repeat(64).as_str(), 0, 2000);

        assert_eq!(store.put_event(older).await.unwrap(), PutOutcome::Stored);
        assert_eq!(store.put_event(newer.clone()).await.unwrap(), PutOutcome::Stored);

        let rows = store.query(StoreFilter::new().author("pk1").kind(0)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, newer.id);
    }

    #[tokio::test]
    async fn rejects_stale_replaceable_event() {
        let store = store().await;
        let newer = sample_event("b".repeat(64).as_str(), 0, 2000);
        let older = sample_event("a".repeat(64).as_str(), 0, 1000);

        store.put_event(newer).await.unwrap();
        assert_eq!(store.put_event(older).await.unwrap(), PutOutcome::Duplicate);
    }

    #[tokio::test]
    async fn query_respects_limit_and_order() {
        let store = store().await;
        for (i, ts) in [(0, 1000), (1, 2000), (2, 3000)] {
            let id = format!("{:0>64}", format!("e{i}"));
            store.put_event(sample_event(&id, 1, ts)).await.unwrap();
        }

        let rows = store.query(StoreFilter::new().kind(1).limit(2)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].created_at > rows[1].created_at);
    }
}
