//! Durable resource store.
//!
//! The store owns the on-disk schema and all persistence semantics: atomic
//! upserts, hash verification on both writes and reads, and the expiry scan
//! backing the eviction sweep. Everything above it goes through the
//! [`Store`] trait so tests can swap the SQLite backend for [`MemoryStore`].

pub mod memory;
pub mod migrations;
pub mod sqlite;

use crate::error::StoreError;
use crate::normalize::{Normalized, compute_content_hash};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// A cached resource as persisted in the store.
///
/// Records are replaced whole on revalidation, never edited field by field.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    /// Caller-supplied logical key; primary identity in the store.
    pub key: String,
    /// Lowercase hex SHA-256 of `payload`.
    pub content_hash: String,
    pub payload: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
    /// Staleness horizon; `None` means the record never auto-expires.
    pub ttl: Option<Duration>,
    /// Upstream freshness token, when the origin provided one.
    pub etag: Option<String>,
}

impl ResourceRecord {
    /// Build a record from a normalized payload, stamped with the current time.
    pub fn new(key: impl Into<String>, normalized: Normalized, ttl: Option<Duration>, etag: Option<String>) -> Self {
        Self {
            key: key.into(),
            content_hash: normalized.content_hash,
            payload: normalized.payload,
            fetched_at: Utc::now(),
            ttl,
            etag,
        }
    }

    /// When this record expires, or `None` for records without a TTL.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let ttl = self.ttl?;
        let ttl = chrono::Duration::from_std(ttl).ok()?;
        self.fetched_at.checked_add_signed(ttl)
    }

    /// Whether the record is still fresh at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires) => now < expires,
            None => true,
        }
    }

    /// Whether `content_hash` matches a fresh hash of `payload`.
    pub fn verify(&self) -> bool {
        compute_content_hash(&self.payload) == self.content_hash
    }
}

/// Capability interface over the durable store.
///
/// `get` never blocks on the network; corruption detected on read is
/// reported as absence so the engine re-fetches instead of serving bad
/// bytes.
#[async_trait]
pub trait Store: Send + Sync {
    /// Read-only lookup by key.
    async fn get(&self, key: &str) -> Result<Option<ResourceRecord>, StoreError>;

    /// Atomic upsert. Any previous record for the key is fully superseded.
    ///
    /// Rejects records whose hash does not match their payload, so a torn
    /// or unnormalized record can never reach disk.
    async fn put(&self, record: &ResourceRecord) -> Result<(), StoreError>;

    /// Delete a record. Returns `false` when the key was absent.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys whose TTL elapsed before `now`, at most `limit` per call.
    ///
    /// Restartable: deleting the returned keys and calling again walks the
    /// whole expired set. Records without a TTL never appear.
    async fn scan_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[test]
    fn test_record_fresh_without_ttl() {
        let record = ResourceRecord::new("k", normalize(b"data").unwrap(), None, None);
        let far_future = Utc::now() + chrono::Duration::days(365 * 100);
        assert!(record.is_fresh(far_future));
        assert!(record.expires_at().is_none());
    }

    #[test]
    fn test_record_staleness_boundary() {
        let record = ResourceRecord::new("k", normalize(b"data").unwrap(), Some(Duration::from_secs(10)), None);
        assert!(record.is_fresh(record.fetched_at + chrono::Duration::seconds(9)));
        assert!(!record.is_fresh(record.fetched_at + chrono::Duration::seconds(11)));
    }

    #[test]
    fn test_record_verify() {
        let mut record = ResourceRecord::new("k", normalize(b"data").unwrap(), None, None);
        assert!(record.verify());
        record.payload = b"tampered".to_vec();
        assert!(!record.verify());
    }
}
