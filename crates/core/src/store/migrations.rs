//! Database schema migrations.
//!
//! Applied migrations are tracked with SQLite's `PRAGMA user_version`:
//! slot `i` in [`MIGRATIONS`] is version `i + 1`, and the pragma records
//! the highest version applied so far. Each migration is a SQL batch that
//! transforms the schema.

use crate::error::StoreError;
use tokio_rusqlite::Connection;

const MIGRATIONS: &[&str] = &[include_str!("../../migrations/001_resources.sql")];

/// Apply any migrations newer than the database's `user_version`.
pub async fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.call(|conn| -> Result<(), StoreError> {
        let applied: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        for (idx, sql) in MIGRATIONS.iter().enumerate() {
            let version = idx as i64 + 1;
            if version > applied {
                conn.execute_batch(sql)?;
                conn.pragma_update(None, "user_version", version)?;
            }
        }

        Ok(())
    })
    .await
    .map_err(StoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user_version(conn: &Connection) -> i64 {
        conn.call(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let has_resources: bool = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='resources')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();

        assert!(has_resources);
        assert_eq!(user_version(&conn).await, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_already_current_database_untouched() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        // A database already at the newest version skips every batch and
        // keeps its data.
        conn.call(|conn| -> Result<(), StoreError> {
            conn.execute(
                "INSERT INTO resources (key, content_hash, payload, fetched_at)
                 VALUES ('k', 'h', X'00', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        run(&conn).await.unwrap();

        let rows: i64 = conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(user_version(&conn).await, MIGRATIONS.len() as i64);
    }
}
