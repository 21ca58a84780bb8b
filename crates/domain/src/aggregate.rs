//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Ids of child entities this event introduces.
    ///
    /// The event store indexes them so a child (an order item, a payment)
    /// can be traced back to the stream that owns it.
    fn entity_refs(&self) -> Vec<Uuid> {
        Vec::new()
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// In event sourcing, aggregates:
/// - Are rebuilt by replaying events
/// - Validate commands and answer with events
/// - Apply events to update state (pure, deterministic)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the stream id, or None for an aggregate with no events yet.
    fn id(&self) -> Option<AggregateId>;

    /// Version starts at 0 and increments with each applied event.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and must not fail: events are facts.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Trait for aggregates that support snapshotting.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of events between snapshots.
    fn snapshot_interval() -> usize {
        100
    }

    /// Returns true when moving from `from` to `to` crosses a snapshot boundary.
    ///
    /// A commit may append several events at once, so the check looks at the
    /// whole range rather than at the final version alone.
    fn crosses_snapshot(from: Version, to: Version) -> bool {
        let interval = Self::snapshot_interval().max(1) as i64;
        to > from && to.as_i64() / interval > from.as_i64() / interval
    }
}
