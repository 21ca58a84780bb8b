use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{EventStore, StreamAppend, validate_commit},
};

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, entity_refs";

/// PostgreSQL-backed event store.
///
/// A commit runs in one transaction. It takes a transaction-scoped advisory
/// lock per touched stream (in sorted order, so two commits cannot deadlock),
/// checks every expected version, and inserts. The `unique_aggregate_version`
/// constraint backs the version check.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `events` and `snapshots` tables if needed.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            entity_refs: row.try_get("entity_refs")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip_all, fields(streams = appends.len()))]
    async fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<Version>> {
        validate_commit(&appends)?;

        let mut tx = self.pool.begin().await?;

        let mut lock_order: Vec<Uuid> = appends.iter().map(|a| a.aggregate_id.as_uuid()).collect();
        lock_order.sort();
        for stream in lock_order {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
                .bind(stream)
                .execute(&mut *tx)
                .await?;
        }

        for append in &appends {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                    .bind(append.aggregate_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;
            let actual = Version::new(current.unwrap_or(0));

            if actual != append.expected_version {
                metrics::counter!("event_store_conflicts_total").increment(1);
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: append.aggregate_id,
                    expected: append.expected_version,
                    actual,
                });
            }
        }

        let mut versions = Vec::with_capacity(appends.len());
        for append in &appends {
            for event in &append.events {
                sqlx::query(
                    r#"
                    INSERT INTO events
                        (id, event_type, aggregate_id, aggregate_type, version,
                         timestamp, payload, entity_refs)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(event.event_id.as_uuid())
                .bind(&event.event_type)
                .bind(event.aggregate_id.as_uuid())
                .bind(&event.aggregate_type)
                .bind(event.version.as_i64())
                .bind(event.timestamp)
                .bind(&event.payload)
                .bind(&event.entity_refs)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.constraint() == Some("unique_aggregate_version")
                    {
                        return EventStoreError::ConcurrencyConflict {
                            aggregate_id: append.aggregate_id,
                            expected: append.expected_version,
                            actual: event.version,
                        };
                    }
                    EventStoreError::Database(e)
                })?;
            }
            versions.push(append.last_version());
        }

        tx.commit().await?;
        Ok(versions)
    }

    async fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_id = $1 AND version >= $2 \
             ORDER BY version ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .bind(from_version.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, aggregate_id: AggregateId) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(Version::new(version.unwrap_or(0)))
    }

    async fn locate_owner(&self, entity_id: Uuid) -> Result<Option<AggregateId>> {
        let owner: Option<Uuid> = sqlx::query_scalar(
            "SELECT aggregate_id FROM events \
             WHERE $1 = ANY(entity_refs) ORDER BY version ASC LIMIT 1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(owner.map(AggregateId::from_uuid))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, taken_at, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                taken_at = EXCLUDED.taken_at,
                state = EXCLUDED.state
            WHERE snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.taken_at)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, taken_at, state
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                taken_at: row.try_get("taken_at")?,
                state: row.try_get("state")?,
            })
        })
        .transpose()
    }
}
