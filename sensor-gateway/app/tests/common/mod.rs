#![allow(dead_code)]

use parking_lot::Mutex;
use reqwest::StatusCode;
use sensor_gateway::buffer::ReadingBuffer;
use sensor_gateway::domain::{Batch, Reading};
use sensor_gateway::sender::{BatchEndpoint, ClientError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub fn reading(i: usize) -> Reading {
    Reading::new(
        format!("sensor-{i}"),
        60.0 + i as f64,
        1_700_000_000.0 + i as f64,
    )
}

pub fn device_ids(readings: &[Reading]) -> Vec<String> {
    readings.iter().map(|r| r.device_id.clone()).collect()
}

pub fn fill(buffer: &ReadingBuffer, range: std::ops::Range<usize>) {
    for i in range {
        buffer.push(reading(i));
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Status(StatusCode),
    Timeout,
}

#[derive(Default)]
struct FakeState {
    script: Mutex<VecDeque<Scripted>>,
    received: Mutex<Vec<Batch>>,
    // Readings pushed into the buffer while a request is "in flight"
    inject: Mutex<Option<(Arc<ReadingBuffer>, Vec<Reading>)>>,
}

/// Endpoint double that answers from a script and records every batch.
///
/// Once the script is exhausted every request succeeds with 200.
#[derive(Clone, Default)]
pub struct FakeEndpoint {
    state: Arc<FakeState>,
    latency: Duration,
}

impl FakeEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: impl IntoIterator<Item = Scripted>) -> Self {
        let endpoint = Self::default();
        endpoint.state.script.lock().extend(script);
        endpoint
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Push `readings` into `buffer` during the next request.
    pub fn inject_during_send(&self, buffer: Arc<ReadingBuffer>, readings: Vec<Reading>) {
        *self.state.inject.lock() = Some((buffer, readings));
    }

    pub fn received(&self) -> Vec<Batch> {
        self.state.received.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.received.lock().len()
    }
}

impl BatchEndpoint for FakeEndpoint {
    async fn send_batch(&self, batch: &Batch) -> Result<StatusCode, ClientError> {
        self.state.received.lock().push(batch.clone());

        let inject = self.state.inject.lock().take();
        if let Some((buffer, readings)) = inject {
            for reading in readings {
                buffer.push(reading);
            }
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.state.script.lock().pop_front();
        match next {
            Some(Scripted::Status(status)) => Ok(status),
            Some(Scripted::Timeout) => Err(ClientError::RequestTimeout(Duration::from_secs(10))),
            None => Ok(StatusCode::OK),
        }
    }
}
