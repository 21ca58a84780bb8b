use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{AggregateId, Result, Version};

/// Serialized aggregate state at a given stream version.
///
/// Loading starts from the latest snapshot and replays only the events after
/// `version`, so materialized counters never need a full stream scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,
    pub version: Version,
    pub taken_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

impl Snapshot {
    /// Captures `state` as the snapshot of `aggregate_id` at `version`.
    pub fn capture<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            taken_at: Utc::now(),
            state: serde_json::to_value(state)?,
        })
    }

    /// Restores the typed aggregate state.
    pub fn restore<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.state.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Counter {
        current_stock: i64,
        movements: u64,
    }

    #[test]
    fn capture_then_restore() {
        let id = AggregateId::new();
        let state = Counter {
            current_stock: 17,
            movements: 4,
        };

        let snapshot = Snapshot::capture(id, "ProductStock", Version::new(4), &state).unwrap();
        assert_eq!(snapshot.aggregate_id, id);
        assert_eq!(snapshot.version, Version::new(4));

        let restored: Counter = snapshot.restore().unwrap();
        assert_eq!(restored, state);
    }
}
