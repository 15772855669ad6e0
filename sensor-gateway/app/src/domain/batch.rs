use super::reading::Reading;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// One upload attempt's worth of readings, in buffer order.
///
/// Serializes to the body the ingestion endpoint expects:
/// `{"gateway_id": ..., "timestamp": ..., "readings": [...]}`. The batch id
/// only exists for log correlation and travels as a header.
#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    #[serde(skip)]
    id: String,
    gateway_id: String,
    timestamp: f64,
    readings: Vec<Reading>,
}

impl Batch {
    pub fn new(gateway_id: impl Into<String>, readings: Vec<Reading>) -> Self {
        Self::with_timestamp(gateway_id, readings, epoch_seconds_now())
    }

    pub fn with_timestamp(
        gateway_id: impl Into<String>,
        readings: Vec<Reading>,
        timestamp: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            gateway_id: gateway_id.into(),
            timestamp,
            readings,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn size(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub fn epoch_seconds_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
