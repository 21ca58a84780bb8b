//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use event_store::{
    AggregateId, EventEnvelope, EventStore, EventStoreError, EventStoreExt, PostgresEventStore,
    Snapshot, StreamAppend, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_events_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Fresh store with its own pool and empty tables.
async fn get_test_store() -> PostgresEventStore {
    let info = get_container_info().await;
    let store = PostgresEventStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, snapshots")
        .execute(store.pool())
        .await
        .unwrap();

    store
}

fn event(aggregate_id: AggregateId, version: i64, refs: &[Uuid]) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("TestAggregate")
        .event_type("Tested")
        .version(Version::new(version))
        .payload_raw(serde_json::json!({"version": version}))
        .entity_refs(refs.iter().copied())
        .build()
        .unwrap()
}

fn append(aggregate_id: AggregateId, expected: i64, count: i64) -> StreamAppend {
    StreamAppend {
        aggregate_id,
        expected_version: Version::new(expected),
        events: (1..=count)
            .map(|n| event(aggregate_id, expected + n, &[]))
            .collect(),
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn commit_and_read_back() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let versions = store.commit(vec![append(id, 0, 3)]).await.unwrap();
    assert_eq!(versions, vec![Version::new(3)]);

    let events = store.read_full_stream(id).await.unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].version, Version::first());
    assert_eq!(events[2].payload["version"], 3);
    assert_eq!(store.stream_version(id).await.unwrap(), Version::new(3));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn stale_stream_rolls_back_whole_commit() {
    let store = get_test_store().await;
    let order = AggregateId::new();
    let stock = AggregateId::new();
    store.commit(vec![append(stock, 0, 2)]).await.unwrap();

    let result = store
        .commit(vec![append(order, 0, 1), append(stock, 1, 1)])
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { aggregate_id, .. }) if aggregate_id == stock
    ));
    assert!(store.read_full_stream(order).await.unwrap().is_empty());
    assert_eq!(store.stream_version(stock).await.unwrap(), Version::new(2));
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn concurrent_commits_have_one_winner() {
    let store = get_test_store().await;
    let order = AggregateId::new();
    let stock = AggregateId::new();

    let (a, b) = tokio::join!(
        store.commit(vec![append(order, 0, 1), append(stock, 0, 1)]),
        store.commit(vec![append(stock, 0, 1), append(order, 0, 1)])
    );

    assert!(a.is_ok() ^ b.is_ok());
    assert_eq!(store.stream_version(order).await.unwrap(), Version::first());
    assert_eq!(store.stream_version(stock).await.unwrap(), Version::first());
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn locate_owner_through_entity_refs() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    let payment = Uuid::new_v4();

    store
        .commit(vec![StreamAppend {
            aggregate_id: id,
            expected_version: Version::initial(),
            events: vec![event(id, 1, &[]), event(id, 2, &[payment])],
        }])
        .await
        .unwrap();

    assert_eq!(store.locate_owner(payment).await.unwrap(), Some(id));
    assert_eq!(store.locate_owner(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
#[serial]
#[ignore = "requires a Docker daemon"]
async fn snapshot_upsert_keeps_newest() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    store.commit(vec![append(id, 0, 6)]).await.unwrap();

    store
        .save_snapshot(Snapshot::capture(id, "TestAggregate", Version::new(5), &5).unwrap())
        .await
        .unwrap();
    store
        .save_snapshot(Snapshot::capture(id, "TestAggregate", Version::new(2), &2).unwrap())
        .await
        .unwrap();

    let (snapshot, tail) = store.load_aggregate(id).await.unwrap();
    let snapshot = snapshot.unwrap();
    assert_eq!(snapshot.version, Version::new(5));
    assert_eq!(snapshot.restore::<i32>().unwrap(), 5);
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].version, Version::new(6));
}
