use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{AggregateId, EventEnvelope, EventStoreError, Result, Snapshot, Version};

/// Events to append to one stream, conditioned on the stream's current version.
#[derive(Debug, Clone)]
pub struct StreamAppend {
    pub aggregate_id: AggregateId,

    /// The version the writer read. The append fails with
    /// [`EventStoreError::ConcurrencyConflict`] if the stream has moved on.
    pub expected_version: Version,

    /// Events numbered `expected_version + 1` onwards.
    pub events: Vec<EventEnvelope>,
}

impl StreamAppend {
    /// Version of the stream once this append lands.
    pub fn last_version(&self) -> Version {
        self.events
            .last()
            .map(|e| e.version)
            .unwrap_or(self.expected_version)
    }
}

/// Core trait for event store implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends to every stream in `appends` atomically.
    ///
    /// Either all streams are written or none is. Returns the new version of
    /// each stream, in input order.
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>>;

    /// Returns the events of a stream with `version >= from_version`, oldest first.
    async fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the current version of a stream (0 if it has no events).
    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Version>;

    /// Finds the stream whose events introduced the child entity `entity_id`.
    async fn locate_owner(&self, entity_id: Uuid) -> Result<Option<AggregateId>>;

    /// Saves a snapshot, replacing any older one for the same stream.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Returns the latest snapshot of a stream.
    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>>;
}

/// Lets a store chosen at runtime (`Arc<dyn EventStore>`) be used wherever a
/// concrete store is expected.
#[async_trait]
impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        (**self).commit(appends).await
    }

    async fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        (**self).read_stream(aggregate_id, from_version).await
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        (**self).stream_version(aggregate_id).await
    }

    async fn locate_owner(&self, entity_id: Uuid) -> Result<Option<AggregateId>> {
        (**self).locate_owner(entity_id).await
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        (**self).save_snapshot(snapshot).await
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        (**self).get_snapshot(aggregate_id).await
    }
}

/// Convenience methods available on every event store.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Returns every event of a stream, oldest first.
    async fn read_full_stream(&self, aggregate_id: AggregateId) -> Result<Vec<EventEnvelope>> {
        self.read_stream(aggregate_id, Version::first()).await
    }

    /// Returns the latest snapshot (if any) and the events recorded after it.
    async fn load_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(aggregate_id).await? {
            let events = self
                .read_stream(aggregate_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.read_full_stream(aggregate_id).await?;
            Ok((None, events))
        }
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a commit is well formed before any stream is touched.
///
/// Each stream may appear once, must carry at least one event, and its events
/// must belong to it and be numbered consecutively from `expected_version + 1`.
pub fn validate_commit(appends: &[StreamAppend]) -> Result<()> {
    if appends.is_empty() {
        return Err(EventStoreError::InvalidAppend(
            "commit contains no streams".to_string(),
        ));
    }

    for (index, append) in appends.iter().enumerate() {
        if appends[..index]
            .iter()
            .any(|other| other.aggregate_id == append.aggregate_id)
        {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} appears twice in one commit",
                append.aggregate_id
            )));
        }

        if append.events.is_empty() {
            return Err(EventStoreError::InvalidAppend(format!(
                "stream {} has no events",
                append.aggregate_id
            )));
        }

        let mut expected = append.expected_version;
        for event in &append.events {
            expected = expected.next();
            if event.aggregate_id != append.aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event {} does not belong to stream {}",
                    event.event_id, append.aggregate_id
                )));
            }
            if event.version != expected {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event versions must be sequential: expected {}, got {}",
                    expected, event.version
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type("Tested")
            .aggregate_id(aggregate_id)
            .aggregate_type("Test")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    fn append(aggregate_id: AggregateId, expected: i64, versions: &[i64]) -> StreamAppend {
        StreamAppend {
            aggregate_id,
            expected_version: Version::new(expected),
            events: versions.iter().map(|v| envelope(aggregate_id, *v)).collect(),
        }
    }

    #[test]
    fn accepts_sequential_multi_stream_commit() {
        let a = AggregateId::new();
        let b = AggregateId::new();
        let appends = vec![append(a, 0, &[1, 2]), append(b, 4, &[5])];
        assert!(validate_commit(&appends).is_ok());
        assert_eq!(appends[0].last_version(), Version::new(2));
        assert_eq!(appends[1].last_version(), Version::new(5));
    }

    #[test]
    fn rejects_empty_commit() {
        assert!(validate_commit(&[]).is_err());
    }

    #[test]
    fn rejects_gap_in_versions() {
        let a = AggregateId::new();
        assert!(validate_commit(&[append(a, 2, &[4])]).is_err());
    }

    #[test]
    fn rejects_duplicate_stream() {
        let a = AggregateId::new();
        assert!(validate_commit(&[append(a, 0, &[1]), append(a, 1, &[2])]).is_err());
    }

    #[test]
    fn rejects_foreign_event() {
        let a = AggregateId::new();
        let mut bad = append(a, 0, &[1]);
        bad.events.push(envelope(AggregateId::new(), 2));
        assert!(validate_commit(&[bad]).is_err());
    }
}
