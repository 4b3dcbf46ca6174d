//! The resolve state machine.
//!
//! Per key a resource moves through `Absent -> Fetching -> Present(fresh)
//! -> Present(stale) -> Evicted`. A fresh record is served straight from
//! the store. A stale record triggers revalidation under the configured
//! [`RevalidatePolicy`], and a failed revalidation never discards a
//! still-usable stale record. A miss drives a single-flight fetch whose
//! result flows through the normalizer into the store.
//!
//! Fetch work always runs in a spawned task: a caller that gives up
//! waiting does not cancel the fetch, and its eventual result still lands
//! in the store for other callers.

use crate::inflight::{InflightTable, Outcome};
use chrono::{DateTime, Utc};
use shaft_client::{FetchError, Fetcher};
use shaft_core::{AppConfig, NormalizeError, ResourceRecord, RevalidatePolicy, Store, StoreError, normalize};
use std::sync::Arc;
use std::time::Duration;

/// Keys deleted per store round-trip during an eviction sweep.
const EVICT_BATCH: usize = 256;

/// Errors surfaced by [`CacheEngine::resolve`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller's wait elapsed. The underlying fetch keeps running.
    #[error("resolve timed out waiting on an in-flight fetch")]
    Timeout,
}

/// Engine-wide defaults, overridable per call via [`ResolveOptions`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// TTL stamped on fetched records; `None` means records never
    /// auto-expire.
    pub default_ttl: Option<Duration>,
    /// How long a resolve call waits on an in-flight fetch.
    pub resolve_timeout: Duration,
    pub revalidate_policy: RevalidatePolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_ttl: None,
            resolve_timeout: Duration::from_secs(30),
            revalidate_policy: RevalidatePolicy::default(),
        }
    }
}

impl EngineOptions {
    /// Derive engine options from the loaded application config.
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            default_ttl: config.default_ttl(),
            resolve_timeout: config.resolve_timeout(),
            revalidate_policy: config.revalidate_policy,
        }
    }
}

/// Per-call overrides for [`CacheEngine::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub ttl_override: Option<Duration>,
    pub timeout: Option<Duration>,
    pub revalidate_policy: Option<RevalidatePolicy>,
}

/// Orchestrates store, fetcher, and in-flight table.
///
/// Cheap to clone; clones share the store, the fetcher, and the in-flight
/// table, so the single-flight guarantee holds across clones.
#[derive(Clone)]
pub struct CacheEngine {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    inflight: Arc<InflightTable>,
    options: EngineOptions,
}

impl CacheEngine {
    pub fn new(store: Arc<dyn Store>, fetcher: Arc<dyn Fetcher>, options: EngineOptions) -> Self {
        Self { store, fetcher, inflight: Arc::new(InflightTable::default()), options }
    }

    /// Resolve a resource by key, fetching from `address` when the store
    /// cannot serve it.
    ///
    /// Fresh records are returned without any network activity. Stale
    /// records are revalidated per policy; a failed revalidation serves
    /// the stale record rather than an error. Misses block on a
    /// single-flight fetch up to the resolve timeout.
    pub async fn resolve(
        &self, key: &str, address: &str, options: ResolveOptions,
    ) -> Result<ResourceRecord, ResolveError> {
        let timeout = options.timeout.unwrap_or(self.options.resolve_timeout);
        let ttl = options.ttl_override.or(self.options.default_ttl);
        let policy = options.revalidate_policy.unwrap_or(self.options.revalidate_policy);

        match self.store.get(key).await? {
            Some(record) if record.is_fresh(Utc::now()) => Ok(record),
            Some(stale) => match policy {
                RevalidatePolicy::ServeStaleThenRefresh => {
                    tracing::debug!(key, "serving stale record while revalidating in background");
                    let _ = self.spawn_fetch(key, address, ttl);
                    Ok(stale)
                }
                RevalidatePolicy::RefreshThenServe => match self.await_fetch(key, address, ttl, timeout).await {
                    Ok(record) => Ok(record),
                    Err(err) => {
                        // Fail open: the last known good record beats an error.
                        tracing::warn!(key, error = %err, "revalidation failed, serving stale record");
                        Ok(stale)
                    }
                },
            },
            None => self.await_fetch(key, address, ttl, timeout).await,
        }
    }

    /// Delete every record whose TTL elapsed before `now`.
    ///
    /// Returns the eviction count. Records without a TTL are never touched.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut evicted = 0u64;
        loop {
            let batch = self.store.scan_expired(now, EVICT_BATCH).await?;
            if batch.is_empty() {
                break;
            }
            for key in batch {
                if self.store.delete(&key).await? {
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            tracing::debug!(evicted, "expired records evicted");
        }
        Ok(evicted)
    }

    /// Join or start the single-flight fetch for `key`.
    ///
    /// The owning task carries a completion guard: even if it panics, the
    /// in-flight entry is cleared and waiters get an error rather than
    /// waiting out their timeout on a dead channel.
    fn spawn_fetch(&self, key: &str, address: &str, ttl: Option<Duration>) -> tokio::sync::broadcast::Receiver<Outcome> {
        let (rx, guard) = self.inflight.join(key);
        if let Some(guard) = guard {
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&self.fetcher);
            let key = key.to_string();
            let address = address.to_string();
            tokio::spawn(async move {
                let outcome = fetch_and_persist(store.as_ref(), fetcher.as_ref(), &key, &address, ttl).await;
                if let Err(err) = &outcome {
                    tracing::warn!(key = %key, error = %err, "fetch failed");
                }
                guard.complete(outcome);
            });
        }
        rx
    }

    async fn await_fetch(
        &self, key: &str, address: &str, ttl: Option<Duration>, timeout: Duration,
    ) -> Result<ResourceRecord, ResolveError> {
        let mut rx = self.spawn_fetch(key, address, ttl);
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ResolveError::Fetch(FetchError::ConnectionFailed(
                "in-flight fetch aborted".to_string(),
            ))),
            Err(_) => Err(ResolveError::Timeout),
        }
    }
}

/// Fetch, normalize, and persist one resource. Runs inside the spawned
/// single-flight task.
async fn fetch_and_persist(
    store: &dyn Store, fetcher: &dyn Fetcher, key: &str, address: &str, ttl: Option<Duration>,
) -> Outcome {
    let fetched = fetcher.fetch(address).await?;
    let normalized = normalize(&fetched.bytes)?;
    let record = ResourceRecord::new(key, normalized, ttl, fetched.etag);
    store.put(&record).await?;
    tracing::debug!(key, bytes = record.payload.len(), "record refreshed");
    Ok(record)
}
