pub mod ingest;
pub mod mqtt;

pub use ingest::{IngestCollector, IngestError, IngestStats, MessageHandler, parse_reading};
pub use mqtt::{MqttConfig, MqttSubscriber};
