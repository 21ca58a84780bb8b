//! Multi-aggregate unit of work.
//!
//! One business operation may touch several streams: an order and the stock
//! ledgers of the products it delivers. The unit of work loads each of them,
//! remembers the version it saw, and commits every staged event in a single
//! [`EventStore::commit`]. If any stream moved in the meantime the whole commit
//! fails with a conflict and nothing is written. Dropping a unit of work
//! without committing discards everything staged.

use std::collections::HashMap;

use common::AggregateId;
use event_store::{EventEnvelope, EventStore, EventStoreExt, Snapshot, StreamAppend, Version};

use crate::aggregate::{DomainEvent, SnapshotCapable};
use crate::error::DomainError;

struct StagedStream {
    append: StreamAppend,
    snapshot: Option<Snapshot>,
}

pub struct UnitOfWork<'a, S: EventStore + ?Sized> {
    store: &'a S,
    loaded: HashMap<AggregateId, Version>,
    staged: Vec<StagedStream>,
}

impl<'a, S: EventStore + ?Sized> UnitOfWork<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            loaded: HashMap::new(),
            staged: Vec::new(),
        }
    }

    /// Rebuilds an aggregate from its latest snapshot plus the events after it.
    ///
    /// A stream with no events yields `A::default()` at version 0.
    pub async fn load<A: SnapshotCapable>(&mut self, id: AggregateId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_aggregate(id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => {
                let mut restored: A = snapshot.restore()?;
                restored.set_version(snapshot.version);
                restored
            }
            None => A::default(),
        };

        for envelope in events {
            let event: A::Event = envelope.decode()?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        self.loaded.insert(id, aggregate.version());
        Ok(aggregate)
    }

    /// Applies `events` to `aggregate` and queues them for commit.
    ///
    /// May be called more than once for the same stream; the events are
    /// appended to what is already staged.
    pub fn stage<A: SnapshotCapable>(
        &mut self,
        id: AggregateId,
        aggregate: &mut A,
        events: Vec<A::Event>,
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let expected = *self.loaded.entry(id).or_insert_with(|| aggregate.version());

        let mut envelopes = Vec::with_capacity(events.len());
        for event in events {
            let version = aggregate.version().next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(&event)?
                .entity_refs(event.entity_refs())
                .build()?;
            envelopes.push(envelope);

            aggregate.apply(event);
            aggregate.set_version(version);
        }

        let snapshot = if A::crosses_snapshot(expected, aggregate.version()) {
            Some(Snapshot::capture(
                id,
                A::aggregate_type(),
                aggregate.version(),
                &*aggregate,
            )?)
        } else {
            None
        };

        match self.staged.iter_mut().find(|s| s.append.aggregate_id == id) {
            Some(staged) => {
                staged.append.events.extend(envelopes);
                staged.snapshot = snapshot.or(staged.snapshot.take());
            }
            None => self.staged.push(StagedStream {
                append: StreamAppend {
                    aggregate_id: id,
                    expected_version: expected,
                    events: envelopes,
                },
                snapshot,
            }),
        }

        Ok(())
    }

    /// Returns true if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Number of events staged across all streams.
    pub fn staged_events(&self) -> usize {
        self.staged.iter().map(|s| s.append.events.len()).sum()
    }

    /// Writes every staged stream atomically, then stores due snapshots.
    ///
    /// Returns the new version of each written stream.
    pub async fn commit(self) -> Result<Vec<Version>, DomainError> {
        if self.staged.is_empty() {
            return Ok(Vec::new());
        }

        let (appends, snapshots): (Vec<_>, Vec<_>) = self
            .staged
            .into_iter()
            .map(|s| (s.append, s.snapshot))
            .unzip();

        let versions = self.store.commit(appends).await?;

        for snapshot in snapshots.into_iter().flatten() {
            let aggregate_id = snapshot.aggregate_id;
            if let Err(error) = self.store.save_snapshot(snapshot).await {
                tracing::warn!(%aggregate_id, %error, "failed to save snapshot");
            }
        }

        Ok(versions)
    }
}
