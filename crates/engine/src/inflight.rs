//! In-flight fetch table.
//!
//! One entry per key with an outstanding fetch. Every concurrent resolver
//! for that key subscribes to the same broadcast channel, so a burst of
//! requests costs exactly one network call. The mutex guards table
//! membership only; it is never held across a fetch.

use crate::engine::ResolveError;
use parking_lot::Mutex;
use shaft_client::FetchError;
use shaft_core::ResourceRecord;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

pub(crate) type Outcome = Result<ResourceRecord, ResolveError>;

#[derive(Debug, Default)]
pub(crate) struct InflightTable {
    entries: Mutex<HashMap<String, broadcast::Sender<Outcome>>>,
}

/// Completion obligation held by the resolver that owns a fetch.
///
/// [`FlightGuard::complete`] broadcasts the outcome. If the guard is
/// dropped without completing (the fetch task panicked or was aborted),
/// the entry is still removed and waiters get an error instead of
/// blocking on a channel nothing will ever send to.
#[derive(Debug)]
pub(crate) struct FlightGuard {
    table: Arc<InflightTable>,
    key: String,
    completed: bool,
}

impl FlightGuard {
    pub fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        self.table.finish(&self.key, outcome);
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.table.finish(
                &self.key,
                Err(ResolveError::Fetch(FetchError::ConnectionFailed(
                    "in-flight fetch aborted".to_string(),
                ))),
            );
        }
    }
}

impl InflightTable {
    /// Join the in-flight fetch for `key`.
    ///
    /// Returns a receiver for the outcome, plus the completion guard when
    /// this caller is the one that must start the fetch. Subscription
    /// happens under the lock, so a receiver can never miss the
    /// completion broadcast.
    pub fn join(self: &Arc<Self>, key: &str) -> (broadcast::Receiver<Outcome>, Option<FlightGuard>) {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(tx) => (tx.subscribe(), None),
            None => {
                let (tx, rx) = broadcast::channel(1);
                entries.insert(key.to_string(), tx);
                let guard = FlightGuard {
                    table: Arc::clone(self),
                    key: key.to_string(),
                    completed: false,
                };
                (rx, Some(guard))
            }
        }
    }

    /// Remove the entry for `key` and broadcast the outcome to its waiters.
    ///
    /// Removal precedes the send so a resolver arriving afterwards starts a
    /// fresh fetch instead of subscribing to a finished one. A send with no
    /// receivers is normal for background revalidation.
    fn finish(&self, key: &str, outcome: Outcome) {
        let tx = self.entries.lock().remove(key);
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaft_core::normalize;

    fn record(key: &str) -> ResourceRecord {
        ResourceRecord::new(key, normalize(b"bytes").unwrap(), None, None)
    }

    #[tokio::test]
    async fn test_first_join_starts() {
        let table = Arc::new(InflightTable::default());
        let (_rx, guard) = table.join("k");
        assert!(guard.is_some());
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_later_joins_share_the_flight() {
        let table = Arc::new(InflightTable::default());
        let (mut rx1, guard) = table.join("k");
        let (mut rx2, second) = table.join("k");
        assert!(second.is_none());

        guard.unwrap().complete(Ok(record("k")));

        assert!(rx1.recv().await.unwrap().is_ok());
        assert!(rx2.recv().await.unwrap().is_ok());
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share() {
        let table = Arc::new(InflightTable::default());
        let (_rx_a, guard_a) = table.join("a");
        let (_rx_b, guard_b) = table.join("b");
        assert!(guard_a.is_some());
        assert!(guard_b.is_some());
    }

    #[tokio::test]
    async fn test_join_after_complete_starts_fresh() {
        let table = Arc::new(InflightTable::default());
        let (_rx, guard) = table.join("k");
        guard.unwrap().complete(Ok(record("k")));

        let (_rx2, guard2) = table.join("k");
        assert!(guard2.is_some());
    }

    #[tokio::test]
    async fn test_dropped_guard_fails_waiters_and_clears_entry() {
        let table = Arc::new(InflightTable::default());
        let (mut rx, guard) = table.join("k");

        drop(guard);

        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome, Err(ResolveError::Fetch(FetchError::ConnectionFailed(_)))));
        assert_eq!(table.len(), 0);

        // The key is free again for the next resolver.
        let (_rx2, guard2) = table.join("k");
        assert!(guard2.is_some());
    }
}
