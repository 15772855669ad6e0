// Upload counters shared between the scheduler task and status reporting.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub readings_delivered: u64,
    pub last_latency: Option<Duration>,
    pub average_latency: Duration,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct UploadStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    readings_delivered: AtomicU64,
    total_latency_ms: AtomicU64,
    last_latency_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl UploadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, readings: usize, latency: Duration) {
        self.record_attempt(latency);
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.readings_delivered
            .fetch_add(readings as u64, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    pub fn record_failure(&self, latency: Duration, error: &str) {
        self.record_attempt(latency);
        self.failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    fn record_attempt(&self, latency: Duration) {
        let millis = latency.as_millis() as u64;
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(millis, Ordering::Relaxed);
        self.last_latency_ms.store(millis, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UploadMetrics {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let total_latency_ms = self.total_latency_ms.load(Ordering::Relaxed);

        let average_latency = if attempts > 0 {
            Duration::from_millis(total_latency_ms / attempts)
        } else {
            Duration::ZERO
        };

        UploadMetrics {
            attempts,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            readings_delivered: self.readings_delivered.load(Ordering::Relaxed),
            last_latency: (attempts > 0)
                .then(|| Duration::from_millis(self.last_latency_ms.load(Ordering::Relaxed))),
            average_latency,
            last_error: self.last_error.lock().clone(),
        }
    }
}
