use sensor_gateway::buffer::ReadingBuffer;
use sensor_gateway::collector::{IngestCollector, IngestError, MessageHandler};
use std::sync::Arc;
use std::thread;

const TOPIC: &str = "sensors/temperature";

fn payload(device: usize, seq: usize) -> Vec<u8> {
    format!(
        r#"{{"device_id":"sensor-{device}","temperature":{}.5,"timestamp":{}}}"#,
        60 + seq % 20,
        1_700_000_000 + seq
    )
    .into_bytes()
}

#[test]
fn test_concurrent_delivery_from_many_threads() {
    let buffer = Arc::new(ReadingBuffer::new(10_000).unwrap());
    let collector = Arc::new(IngestCollector::new(Arc::clone(&buffer)));

    let handles: Vec<_> = (0..8)
        .map(|device| {
            let handler: Arc<dyn MessageHandler> = collector.clone();
            thread::spawn(move || {
                for seq in 0..250 {
                    handler.on_message(TOPIC, &payload(device, seq));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = collector.stats();
    assert_eq!(stats.received, 2000);
    assert_eq!(stats.accepted, 2000);
    assert_eq!(buffer.size(), 2000);

    // Per device, readings keep their arrival order
    let readings = buffer.readings();
    for device in 0..8 {
        let id = format!("sensor-{device}");
        let timestamps: Vec<f64> = readings
            .iter()
            .filter(|r| r.device_id == id)
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(timestamps.len(), 250);
        assert!(timestamps.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_malformed_messages_are_dropped_and_counted() {
    let buffer = Arc::new(ReadingBuffer::new(10).unwrap());
    let collector = IngestCollector::new(Arc::clone(&buffer));

    collector.on_message(TOPIC, b"not json");
    collector.on_message(TOPIC, b"[1, 2, 3]");
    collector.on_message(TOPIC, br#"{"device_id":"s1","temperature":"hot","timestamp":1.0}"#);
    collector.on_message(TOPIC, br#"{"device_id":"s1","timestamp":1.0}"#);
    collector.on_message(TOPIC, br#"{"device_id":null,"temperature":1.0,"timestamp":1.0}"#);
    collector.on_message(TOPIC, &payload(1, 1));

    let stats = collector.stats();
    assert_eq!(stats.received, 6);
    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.parse_errors, 3);
    assert_eq!(stats.missing_field_errors, 2);
    assert_eq!(buffer.size(), 1);
}

#[test]
fn test_ingest_reports_the_missing_field() {
    let buffer = Arc::new(ReadingBuffer::new(10).unwrap());
    let collector = IngestCollector::new(buffer);

    assert_eq!(
        collector.ingest(br#"{"device_id":"s1","temperature":21.0}"#),
        Err(IngestError::MissingField("timestamp"))
    );
    assert!(collector.buffer().is_empty());
}

#[test]
fn test_ingest_into_full_buffer_evicts_oldest() {
    let buffer = Arc::new(ReadingBuffer::new(3).unwrap());
    let collector = IngestCollector::new(Arc::clone(&buffer));

    for seq in 0..5 {
        collector.ingest(&payload(seq, seq)).unwrap();
    }

    let ids: Vec<String> = buffer.readings().into_iter().map(|r| r.device_id).collect();
    assert_eq!(ids, vec!["sensor-2", "sensor-3", "sensor-4"]);
    assert_eq!(collector.stats().accepted, 5);
    assert_eq!(buffer.metrics().evicted, 2);
}
