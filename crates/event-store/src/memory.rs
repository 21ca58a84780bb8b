use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, StreamAppend, validate_commit},
};

#[derive(Default)]
struct MemoryState {
    streams: HashMap<AggregateId, Vec<EventEnvelope>>,
    owners: HashMap<Uuid, AggregateId>,
    snapshots: HashMap<AggregateId, Snapshot>,
    event_count: usize,
}

impl MemoryState {
    fn version_of(&self, aggregate_id: AggregateId) -> Version {
        self.streams
            .get(&aggregate_id)
            .and_then(|events| events.last())
            .map(|e| e.version)
            .unwrap_or(Version::initial())
    }
}

/// In-memory event store.
///
/// A commit holds the write lock while it checks every expected version and
/// appends, so concurrent commits touching a common stream are serialized and
/// the loser gets a [`EventStoreError::ConcurrencyConflict`].
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all streams.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.event_count
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_commit(&appends)?;

        let mut state = self.state.write().await;

        for append in &appends {
            let actual = state.version_of(append.aggregate_id);
            if actual != append.expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected: append.expected_version,
                    actual,
                });
            }
        }

        let mut versions = Vec::with_capacity(appends.len());
        for append in appends {
            versions.push(append.last_version());
            for event in &append.events {
                for entity in &event.entity_refs {
                    state.owners.insert(*entity, append.aggregate_id);
                }
            }
            state.event_count += append.events.len();
            state
                .streams
                .entry(append.aggregate_id)
                .or_default()
                .extend(append.events);
        }

        Ok(versions)
    }

    async fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .streams
            .get(&aggregate_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.version >= from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        Ok(self.state.read().await.version_of(aggregate_id))
    }

    async fn locate_owner(&self, entity_id: Uuid) -> Result<Option<AggregateId>> {
        Ok(self.state.read().await.owners.get(&entity_id).copied())
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut state = self.state.write().await;
        let newer_exists = state
            .snapshots
            .get(&snapshot.aggregate_id)
            .is_some_and(|existing| existing.version > snapshot.version);
        if !newer_exists {
            state.snapshots.insert(snapshot.aggregate_id, snapshot);
        }
        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        Ok(self.state.read().await.snapshots.get(&aggregate_id).cloned())
    }
}
