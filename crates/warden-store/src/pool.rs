//! Connection pool + migration runner.
//!
//! Shape follows `nostr-sqlite`'s `SQLiteDatabase`: a `deadpool-sqlite` pool
//! of blocking connections, `PRAGMA user_version` as the migration gate, and
//! a single embedded SQL file applied on first open.

use std::sync::atomic::{AtomicU64, Ordering};

use deadpool_sqlite::{Config, Object, Pool, Runtime};
use rusqlite::Connection;

use crate::error::{Result, StoreError};

static MEMORY_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

const DB_VERSION: i64 = 1;
const INIT_SQL: &str = include_str!("migrations/001_init.sql");
const STARTUP_PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
"#;

#[derive(Debug, Clone)]
pub struct SqlitePool {
    pool: Pool,
}

impl SqlitePool {
    pub async fn open(path: &str) -> Result<Self> {
        let cfg = Config::new(path);
        let pool = cfg
            .create_pool(Runtime::Tokio1)
            .map_err(|e| StoreError::StorageIo(e.to_string()))?;
        let this = Self { pool };
        this.migrate().await?;
        Ok(this)
    }

    pub async fn open_in_memory() -> Result<Self> {
        // Named + shared-cache so every pooled connection sees the same
        // backing store (the trick `nostr-gossip` relies on for its
        // in-memory mode); uniquely named per pool so concurrently running
        // tests don't share state through the same memory database.
        let id = MEMORY_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:warden-mem-{id}?mode=memory&cache=shared");
        let cfg = Config::new(uri);
        let pool = cfg
            .create_pool(Runtime::Tokio1)
            .map_err(|e| StoreError::StorageIo(e.to_string()))?;
        let this = Self { pool };
        this.migrate().await?;
        Ok(this)
    }

    async fn migrate(&self) -> Result<()> {
        let conn = self.acquire().await?;
        conn.interact(|conn: &mut Connection| {
            let current: i64 =
                conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            if current < DB_VERSION {
                conn.execute_batch(INIT_SQL)?;
                conn.pragma_update(None, "user_version", DB_VERSION)?;
            }
            Ok::<(), rusqlite::Error>(())
        })
        .await??;
        Ok(())
    }

    /// `foreign_keys` is a per-connection PRAGMA, not a database-file
    /// setting like `journal_mode` — it must be reapplied on every
    /// connection the pool hands out, not just the one `migrate()` used.
    pub async fn acquire(&self) -> Result<Object> {
        let conn = self.pool.get().await?;
        conn.interact(|conn: &mut Connection| conn.execute_batch(STARTUP_PRAGMAS))
            .await??;
        Ok(conn)
    }
}
