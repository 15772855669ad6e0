use serde::{Deserialize, Serialize};

/// A single timestamped measurement reported by an edge device.
///
/// Readings are created when a message arrives at the gateway and are never
/// mutated afterwards. They leave the gateway either inside a delivered batch
/// or by eviction from the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    pub temperature: f64,
    /// Seconds since the Unix epoch, as reported by the device.
    pub timestamp: f64,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, temperature: f64, timestamp: f64) -> Self {
        Self {
            device_id: device_id.into(),
            temperature,
            timestamp,
        }
    }
}
