mod common;

use common::fill;
use sensor_gateway::buffer::ReadingBuffer;
use sensor_gateway::sender::{
    BatchEndpoint, ClientConfig, ClientError, FlushOutcome, HttpEndpoint, UploadError, Uploader,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn endpoint_for(server: &MockServer) -> HttpEndpoint {
    HttpEndpoint::new(ClientConfig {
        endpoint: format!("{}/api/iot-data", server.uri()),
        timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    })
    .unwrap()
}

fn uploader(endpoint: HttpEndpoint, capacity: usize, batch_size: usize) -> Uploader<HttpEndpoint> {
    let buffer = Arc::new(ReadingBuffer::new(capacity).unwrap());
    Uploader::new(buffer, endpoint, "gateway-http", batch_size)
}

#[tokio::test]
async fn test_batch_is_posted_as_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/iot-data"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-batch-id"))
        .and(body_partial_json(json!({ "gateway_id": "gateway-http" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(endpoint_for(&server), 10, 3);
    fill(uploader.buffer(), 0..4);

    let outcome = uploader.flush().await.unwrap();
    assert!(matches!(
        outcome,
        FlushOutcome::Delivered { sent: 3, removed: 3, .. }
    ));
    assert_eq!(uploader.buffer().size(), 1);

    let requests = server.received_requests().await.unwrap();
    let body: Value = requests[0].body_json().unwrap();

    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 3, "only gateway_id, timestamp and readings: {body}");
    assert!(body["timestamp"].as_f64().unwrap() > 1_600_000_000.0);

    let readings = body["readings"].as_array().unwrap();
    assert_eq!(readings.len(), 3);
    assert_eq!(
        readings[0],
        json!({ "device_id": "sensor-0", "temperature": 60.0, "timestamp": 1_700_000_000.0 })
    );
    assert_eq!(readings[2]["device_id"], "sensor-2");
}

#[tokio::test]
async fn test_server_error_keeps_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut uploader = uploader(endpoint_for(&server), 10, 5);
    fill(uploader.buffer(), 0..5);
    let before = uploader.buffer().readings();

    let result = uploader.flush().await;

    assert!(matches!(result, Err(UploadError::Rejected { status: 500 })));
    assert_eq!(uploader.buffer().readings(), before);

    let stats = uploader.stats();
    assert_eq!(stats.attempts, 1);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.readings_delivered, 0);
}

#[tokio::test]
async fn test_client_error_status_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut uploader = uploader(endpoint_for(&server), 10, 5);
    fill(uploader.buffer(), 0..2);

    assert!(matches!(
        uploader.flush().await,
        Err(UploadError::Rejected { status: 401 })
    ));
    assert_eq!(uploader.buffer().size(), 2);
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(ClientConfig {
        endpoint: format!("{}/api/iot-data", server.uri()),
        timeout: Duration::from_millis(200),
        ..ClientConfig::default()
    })
    .unwrap();
    let mut uploader = uploader(endpoint, 10, 5);
    fill(uploader.buffer(), 0..3);

    let result = uploader.flush().await;

    assert!(matches!(
        result,
        Err(UploadError::Client(ClientError::RequestTimeout(_)))
    ));
    assert_eq!(uploader.buffer().size(), 3);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_network_error() {
    // Nothing listens on the discard port
    let endpoint = HttpEndpoint::new(ClientConfig {
        endpoint: "http://127.0.0.1:9/api/iot-data".to_string(),
        timeout: Duration::from_secs(2),
        ..ClientConfig::default()
    })
    .unwrap();
    let mut uploader = uploader(endpoint, 10, 5);
    fill(uploader.buffer(), 0..1);

    let result = uploader.flush().await;

    assert!(matches!(
        result,
        Err(UploadError::Client(ClientError::NetworkError(_)))
    ));
    assert_eq!(uploader.buffer().size(), 1);
}

#[tokio::test]
async fn test_api_key_and_user_agent_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-functions-key", "function-secret"))
        .and(header(
            "user-agent",
            format!("sensor-gateway/{}", sensor_gateway::VERSION).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let endpoint = HttpEndpoint::new(ClientConfig {
        endpoint: format!("{}/api/iot-data", server.uri()),
        api_key: Some("function-secret".to_string()),
        ..ClientConfig::default()
    })
    .unwrap();
    let mut uploader = uploader(endpoint, 10, 5);
    fill(uploader.buffer(), 0..1);

    assert!(uploader.flush().await.is_ok());
}

#[tokio::test]
async fn test_empty_buffer_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut uploader = uploader(endpoint_for(&server), 10, 5);

    assert_eq!(uploader.flush().await.unwrap(), FlushOutcome::Empty);
    assert_eq!(uploader.stats().attempts, 0);
}

#[tokio::test]
async fn test_endpoint_returns_raw_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let endpoint = endpoint_for(&server);
    let batch = sensor_gateway::domain::Batch::new("gateway-http", vec![common::reading(1)]);

    let status = endpoint.send_batch(&batch).await.unwrap();
    assert_eq!(status.as_u16(), 503);
}
