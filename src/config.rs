//! Ingestion configuration

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Options controlling one ingestion call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionOptions {
    /// Treat the first CSV record as a header row.
    pub first_record_as_header: bool,
    /// Maximum rows accumulated before a batch is flushed to the store.
    pub batch_size: usize,
    /// Maximum age of a partially filled batch before it is flushed anyway.
    #[serde(with = "duration_millis")]
    pub batch_timeout: Duration,
    /// Raw tokens treated as NULL when parsing source values.
    pub null_values: HashSet<String>,
    /// Byte threshold above which the source spills to a temp file.
    pub spill_threshold_bytes: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            first_record_as_header: true,
            batch_size: 1000,
            batch_timeout: Duration::from_millis(500),
            null_values: HashSet::new(),
            spill_threshold_bytes: 8 * 1024 * 1024,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let options = IngestionOptions::default();
        let json = serde_json::to_string(&options).unwrap();
        let back: IngestionOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.batch_size, 1000);
        assert_eq!(back.batch_timeout, Duration::from_millis(500));
        assert!(back.first_record_as_header);
    }
}
