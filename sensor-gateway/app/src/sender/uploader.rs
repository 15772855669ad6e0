use super::client::{BatchEndpoint, ClientError};
use super::stats::{UploadMetrics, UploadStats};
use crate::buffer::ReadingBuffer;
use crate::domain::Batch;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A failed upload attempt. The batch stays buffered and the next scheduler
/// tick decides whether to try again.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Endpoint rejected batch with HTTP {status}")]
    Rejected { status: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was buffered, no request was made
    Empty,
    Delivered {
        batch_id: String,
        sent: usize,
        removed: usize,
        latency: Duration,
    },
}

/// Snapshots the oldest readings, uploads them, and removes them only once
/// the endpoint has confirmed the batch.
pub struct Uploader<E> {
    buffer: Arc<ReadingBuffer>,
    endpoint: E,
    gateway_id: String,
    batch_size: usize,
    last_flush: Instant,
    stats: Arc<UploadStats>,
}

impl<E: BatchEndpoint> Uploader<E> {
    pub fn new(
        buffer: Arc<ReadingBuffer>,
        endpoint: E,
        gateway_id: impl Into<String>,
        batch_size: usize,
    ) -> Self {
        Self {
            buffer,
            endpoint,
            gateway_id: gateway_id.into(),
            batch_size,
            last_flush: Instant::now(),
            stats: Arc::new(UploadStats::new()),
        }
    }

    pub async fn flush(&mut self) -> Result<FlushOutcome, UploadError> {
        // The lock is held only while copying; the request runs against the copy
        let snapshot = self.buffer.peek_batch(self.batch_size);
        if snapshot.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let batch = Batch::new(self.gateway_id.clone(), snapshot.readings().to_vec());
        let sent = batch.size();
        let start = Instant::now();

        debug!(batch_id = batch.id(), readings = sent, "Uploading batch");

        let result = self.endpoint.send_batch(&batch).await;
        let latency = start.elapsed();

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    batch_id = batch.id(),
                    readings = sent,
                    "Upload failed, batch kept for next cycle: {e}"
                );
                self.stats.record_failure(latency, &e.to_string());
                return Err(e.into());
            }
        };

        if !status.is_success() {
            let error = UploadError::Rejected {
                status: status.as_u16(),
            };
            warn!(
                batch_id = batch.id(),
                readings = sent,
                "Upload failed, batch kept for next cycle: {error}"
            );
            self.stats.record_failure(latency, &error.to_string());
            return Err(error);
        }

        let removed = self.buffer.remove_acknowledged(&snapshot);
        self.last_flush = Instant::now();
        self.stats.record_success(sent, latency);

        if removed < sent {
            warn!(
                batch_id = batch.id(),
                sent,
                removed,
                "Part of the delivered batch was evicted while in flight"
            );
        }

        info!(
            batch_id = batch.id(),
            readings = sent,
            remaining = self.buffer.size(),
            "Delivered batch in {:?}",
            latency
        );

        Ok(FlushOutcome::Delivered {
            batch_id: batch.id().to_string(),
            sent,
            removed,
            latency,
        })
    }

    /// Time since the last confirmed delivery, or since construction.
    pub fn time_since_last_flush(&self) -> Duration {
        self.last_flush.elapsed()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn buffer(&self) -> &Arc<ReadingBuffer> {
        &self.buffer
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn stats(&self) -> UploadMetrics {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> Arc<UploadStats> {
        Arc::clone(&self.stats)
    }
}
