use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time view of the buffer counters.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferMetrics {
    pub capacity: usize,
    pub len: usize,
    pub pushed: u64,
    pub evicted: u64,
    pub removed: u64,
    pub peak_size: usize,
    pub fill_ratio: f64,
}

/// Lock-free counters updated alongside the buffer's guarded state.
#[derive(Debug, Default)]
pub(crate) struct BufferCounters {
    pushed: AtomicU64,
    evicted: AtomicU64,
    removed: AtomicU64,
    peak_size: AtomicUsize,
}

impl BufferCounters {
    pub(crate) fn record_push(&self, len_after: usize) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.peak_size.fetch_max(len_after, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) -> u64 {
        self.evicted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_removal(&self, count: usize) {
        self.removed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, capacity: usize, len: usize) -> BufferMetrics {
        BufferMetrics {
            capacity,
            len,
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            peak_size: self.peak_size.load(Ordering::Relaxed),
            fill_ratio: len as f64 / capacity as f64,
        }
    }
}
