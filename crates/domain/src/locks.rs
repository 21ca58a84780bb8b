//! Per-stream write serialization inside one process.
//!
//! Writers to the same stream queue on its mutex instead of racing to a
//! version conflict. Cross-process writers still meet at the store's
//! optimistic version check.
//!
//! Lock order: an order stream before any product stream, and product
//! streams in ascending id order. Every caller follows it, so no two tasks
//! can wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use common::AggregateId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Idle entries are dropped once the registry grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

pub type StreamGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct StreamLocks {
    locks: Mutex<HashMap<AggregateId, Arc<Mutex<()>>>>,
}

impl StreamLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to one stream.
    pub async fn lock(&self, id: AggregateId) -> StreamGuard {
        let lock = self.entry(id).await;
        lock.lock_owned().await
    }

    /// Locks several streams in ascending id order. Duplicates are locked
    /// once.
    pub async fn lock_all(&self, ids: impl IntoIterator<Item = AggregateId>) -> Vec<StreamGuard> {
        let mut ids: Vec<AggregateId> = ids.into_iter().collect();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock(id).await);
        }
        guards
    }

    /// Number of streams with a registered mutex.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn entry(&self, id: AggregateId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if locks.len() >= PRUNE_THRESHOLD {
            // Held or awaited mutexes have a second owner.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(id).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_stream_waits_for_holder() {
        let locks = Arc::new(StreamLocks::new());
        let id = AggregateId::new();

        let guard = locks.lock(id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_streams_do_not_block() {
        let locks = StreamLocks::new();
        let _first = locks.lock(AggregateId::new()).await;
        let _second = locks.lock(AggregateId::new()).await;
        assert_eq!(locks.len().await, 2);
    }

    #[tokio::test]
    async fn test_lock_all_dedups() {
        let locks = StreamLocks::new();
        let id = AggregateId::new();
        let other = AggregateId::new();

        let guards = locks.lock_all([id, other, id]).await;
        assert_eq!(guards.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = StreamLocks::new();
        for _ in 0..PRUNE_THRESHOLD {
            drop(locks.lock(AggregateId::new()).await);
        }
        assert_eq!(locks.len().await, PRUNE_THRESHOLD);

        let held = AggregateId::new();
        let _guard = locks.lock(held).await;
        assert_eq!(locks.len().await, 1);
    }
}
