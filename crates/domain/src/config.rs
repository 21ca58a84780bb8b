//! Engine configuration loaded from environment variables.

use std::sync::Arc;
use std::time::Duration;

use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};

use crate::error::DomainError;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Fulfillment engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` or `plain` (default: `plain`)
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory store when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `5`)
/// - `FULFILLMENT_MAX_CONFLICT_RETRIES`: re-runs after a concurrency conflict (default: `3`)
/// - `FULFILLMENT_CONFLICT_BACKOFF_MS`: wait before the first re-run, doubled
///   on each further one (default: `5`)
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub max_conflict_retries: u32,
    pub conflict_backoff: Duration,
}

impl FulfillmentConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Plain,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            max_conflict_retries: lookup("FULFILLMENT_MAX_CONFLICT_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_conflict_retries),
            conflict_backoff: lookup("FULFILLMENT_CONFLICT_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.conflict_backoff),
        }
    }

    /// Opens the configured event store: PostgreSQL (migrated) when
    /// `database_url` is set, in-memory otherwise.
    pub async fn open_event_store(&self) -> Result<Arc<dyn EventStore>, DomainError> {
        match &self.database_url {
            Some(url) => {
                let store = PostgresEventStore::connect(url, self.database_max_connections).await?;
                store.run_migrations().await?;
                tracing::info!("using PostgreSQL event store");
                Ok(Arc::new(store))
            }
            None => {
                tracing::info!("using in-memory event store");
                Ok(Arc::new(InMemoryEventStore::new()))
            }
        }
    }
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Plain,
            database_url: None,
            database_max_connections: 5,
            max_conflict_retries: 3,
            conflict_backoff: Duration::from_millis(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = FulfillmentConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Plain);
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.conflict_backoff, Duration::from_millis(5));
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = FulfillmentConfig::from_lookup(lookup(&[]));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_conflict_retries, 3);
    }

    #[test]
    fn test_reads_every_key() {
        let config = FulfillmentConfig::from_lookup(lookup(&[
            ("RUST_LOG", "domain=debug"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/fulfillment"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("FULFILLMENT_MAX_CONFLICT_RETRIES", "7"),
            ("FULFILLMENT_CONFLICT_BACKOFF_MS", "40"),
        ]));

        assert_eq!(config.log_level, "domain=debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/fulfillment")
        );
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.max_conflict_retries, 7);
        assert_eq!(config.conflict_backoff, Duration::from_millis(40));
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config = FulfillmentConfig::from_lookup(lookup(&[
            ("FULFILLMENT_MAX_CONFLICT_RETRIES", "many"),
            ("DATABASE_URL", ""),
        ]));
        assert_eq!(config.max_conflict_retries, 3);
        assert!(config.database_url.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_store_without_database_url() {
        let store = FulfillmentConfig::default().open_event_store().await.unwrap();
        let version = store
            .stream_version(common::AggregateId::new())
            .await
            .unwrap();
        assert_eq!(version, event_store::Version::initial());
    }
}
