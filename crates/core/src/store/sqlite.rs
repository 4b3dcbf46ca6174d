//! SQLite-backed store.
//!
//! Wraps a tokio-rusqlite connection that runs database operations on a
//! background thread. WAL mode keeps readers unblocked while the engine
//! writes, so a `get` never observes a torn record.

use super::migrations;
use super::{ResourceRecord, Store};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tokio_rusqlite::{Connection, params};
use tokio_rusqlite::rusqlite;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Durable resource store backed by a single SQLite file.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pub(crate) conn: Connection,
}

impl SqliteStore {
    /// Open a store at the given path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and runs any pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Self::init(conn).await
    }

    /// Open an in-memory store for testing, with the same pragma
    /// configuration as file-based stores.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| -> Result<(), StoreError> {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(StoreError::from)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Purge oldest entries until the row count is at most `max_entries`.
    ///
    /// Capacity-driven eviction; returns the number of deleted records.
    pub async fn purge_lru(&self, max_entries: usize) -> Result<u64, StoreError> {
        let max = max_entries as i64;
        self.conn
            .call(move |conn| -> Result<u64, StoreError> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
                if count <= max {
                    return Ok(0);
                }

                let to_delete = count - max;
                let deleted = conn.execute(
                    "DELETE FROM resources WHERE key IN (
                        SELECT key FROM resources ORDER BY fetched_at ASC LIMIT ?1
                    )",
                    params![to_delete],
                )?;
                Ok(deleted as u64)
            })
            .await
            .map_err(StoreError::from)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Io(format!("bad stored timestamp `{raw}`: {e}")))
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<ResourceRecord>, StoreError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<ResourceRecord>, StoreError> {
                let mut stmt = conn.prepare(
                    "SELECT key, content_hash, payload, fetched_at, ttl_secs, etag
                     FROM resources WHERE key = ?1",
                )?;

                let result = stmt.query_row(params![key], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                });

                let (key, content_hash, payload, fetched_at, ttl_secs, etag) = match result {
                    Ok(row) => row,
                    Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };

                let record = ResourceRecord {
                    key,
                    content_hash,
                    payload,
                    fetched_at: parse_timestamp(&fetched_at)?,
                    ttl: ttl_secs.map(|s| Duration::from_secs(s.max(0) as u64)),
                    etag,
                };

                if !record.verify() {
                    // Serving corrupted bytes is strictly worse than a miss;
                    // drop the row so the engine re-fetches.
                    tracing::warn!(key = %record.key, "content hash mismatch on read, dropping record");
                    conn.execute("DELETE FROM resources WHERE key = ?1", params![record.key])?;
                    return Ok(None);
                }

                Ok(Some(record))
            })
            .await
            .map_err(StoreError::from)
    }

    async fn put(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        if !record.verify() {
            return Err(StoreError::Corruption { key: record.key.clone() });
        }

        let expires_at = record.expires_at().map(|t| t.to_rfc3339());
        let record = record.clone();
        self.conn
            .call(move |conn| -> Result<(), StoreError> {
                conn.execute(
                    "INSERT INTO resources (
                        key, content_hash, payload, fetched_at, ttl_secs, expires_at, etag
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(key) DO UPDATE SET
                        content_hash = excluded.content_hash,
                        payload = excluded.payload,
                        fetched_at = excluded.fetched_at,
                        ttl_secs = excluded.ttl_secs,
                        expires_at = excluded.expires_at,
                        etag = excluded.etag",
                    params![
                        record.key,
                        record.content_hash,
                        record.payload,
                        record.fetched_at.to_rfc3339(),
                        record.ttl.map(|t| t.as_secs() as i64),
                        expires_at,
                        record.etag,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(StoreError::from)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, StoreError> {
                let deleted = conn.execute("DELETE FROM resources WHERE key = ?1", params![key])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(StoreError::from)
    }

    async fn scan_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, StoreError> {
        let now = now.to_rfc3339();
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<String>, StoreError> {
                let mut stmt = conn.prepare(
                    "SELECT key FROM resources
                     WHERE expires_at IS NOT NULL AND expires_at < ?1
                     ORDER BY expires_at ASC
                     LIMIT ?2",
                )?;
                let keys = stmt
                    .query_map(params![now, limit], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(StoreError::from)
    }
}
