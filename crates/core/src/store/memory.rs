//! In-memory store for tests.
//!
//! Map-backed implementation of [`Store`] with the same verification
//! semantics as the SQLite backend, so engine tests run without touching
//! disk.

use super::{ResourceRecord, Store};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Map-backed [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ResourceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record without hash verification.
    ///
    /// Fault injection hook: lets tests plant a corrupt record to exercise
    /// the corruption-recovery path, which `put` would reject.
    pub async fn insert_raw(&self, record: ResourceRecord) {
        self.records.lock().await.insert(record.key.clone(), record);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<ResourceRecord>, StoreError> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get(key) else {
            return Ok(None);
        };

        if !record.verify() {
            tracing::warn!(key, "content hash mismatch on read, dropping record");
            records.remove(key);
            return Ok(None);
        }

        Ok(Some(record.clone()))
    }

    async fn put(&self, record: &ResourceRecord) -> Result<(), StoreError> {
        if !record.verify() {
            return Err(StoreError::Corruption { key: record.key.clone() });
        }
        self.records.lock().await.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.records.lock().await.remove(key).is_some())
    }

    async fn scan_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<String>, StoreError> {
        let records = self.records.lock().await;
        let mut expired: Vec<String> = records
            .values()
            .filter(|r| r.expires_at().is_some_and(|t| t < now))
            .map(|r| r.key.clone())
            .collect();
        expired.sort();
        expired.truncate(limit);
        Ok(expired)
    }
}
