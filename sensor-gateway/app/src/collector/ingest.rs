use crate::buffer::ReadingBuffer;
use crate::domain::Reading;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

const REQUIRED_FIELDS: [&str; 3] = ["device_id", "temperature", "timestamp"];

/// Why an inbound message could not be turned into a reading.
///
/// Both variants are a malformed message: the message is dropped and never
/// retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IngestError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

/// Capability the transport invokes once per inbound message.
///
/// Implementations must tolerate concurrent calls; the transport decides how
/// many deliveries are in flight.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub received: u64,
    pub accepted: u64,
    pub parse_errors: u64,
    pub missing_field_errors: u64,
}

#[derive(Debug, Default)]
struct IngestCounters {
    received: AtomicU64,
    accepted: AtomicU64,
    parse_errors: AtomicU64,
    missing_field_errors: AtomicU64,
}

/// Validates inbound payloads and feeds accepted readings into the buffer.
#[derive(Debug)]
pub struct IngestCollector {
    buffer: Arc<ReadingBuffer>,
    counters: IngestCounters,
}

impl IngestCollector {
    pub fn new(buffer: Arc<ReadingBuffer>) -> Self {
        Self {
            buffer,
            counters: IngestCounters::default(),
        }
    }

    /// Parse one payload and push the resulting reading.
    pub fn ingest(&self, payload: &[u8]) -> Result<(), IngestError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let reading = match parse_reading(payload) {
            Ok(reading) => reading,
            Err(e) => {
                let counter = match e {
                    IngestError::Parse(_) => &self.counters.parse_errors,
                    IngestError::MissingField(_) => &self.counters.missing_field_errors,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        debug!(
            device_id = %reading.device_id,
            temperature = reading.temperature,
            "Received reading"
        );

        self.buffer.push(reading);
        let total = self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(accepted_total = total, buffered = self.buffer.size(), "Stored reading");

        Ok(())
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            received: self.counters.received.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            parse_errors: self.counters.parse_errors.load(Ordering::Relaxed),
            missing_field_errors: self.counters.missing_field_errors.load(Ordering::Relaxed),
        }
    }

    pub fn buffer(&self) -> &Arc<ReadingBuffer> {
        &self.buffer
    }
}

impl MessageHandler for IngestCollector {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.ingest(payload) {
            warn!(topic, error = %e, "Dropping malformed message");
        }
    }
}

/// Turn a raw payload into a reading.
///
/// A field that is absent, `null`, or (for `device_id`) empty counts as
/// missing; a present field of the wrong type is a parse error.
pub fn parse_reading(payload: &[u8]) -> Result<Reading, IngestError> {
    let value: Value =
        serde_json::from_slice(payload).map_err(|e| IngestError::Parse(e.to_string()))?;

    let Value::Object(fields) = &value else {
        return Err(IngestError::Parse(format!(
            "expected a JSON object, got {}",
            json_type_name(&value)
        )));
    };

    for field in REQUIRED_FIELDS {
        match fields.get(field) {
            None | Some(Value::Null) => return Err(IngestError::MissingField(field)),
            Some(Value::String(s)) if field == "device_id" && s.is_empty() => {
                return Err(IngestError::MissingField(field));
            }
            Some(_) => {}
        }
    }

    serde_json::from_value(value).map_err(|e| IngestError::Parse(e.to_string()))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
