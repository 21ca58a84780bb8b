//! Append-only event persistence.
//!
//! Streams are keyed by [`AggregateId`]. A commit may touch several streams at
//! once and is all-or-nothing: every stream's expected version is checked
//! before anything is written.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{EventStore, EventStoreExt, StreamAppend};
