//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::config::{FulfillmentConfig, LogFormat};

/// Installs the global tracing subscriber.
///
/// The filter comes from `config.log_level` (an `EnvFilter` directive); an
/// invalid directive falls back to `info`. Fails if a global subscriber is
/// already set.
pub fn init_tracing(config: &FulfillmentConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init()
}
