use super::concurrency::RobustMutex;
use super::error::BufferError;
use super::metrics::{BufferCounters, BufferMetrics};
use crate::domain::Reading;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Occupancy above which the buffer is considered under pressure.
pub const PRESSURE_THRESHOLD: f64 = 0.8;

/// Copy of the oldest buffered readings, taken without removing them.
///
/// Remembers which buffer positions it was taken from so that a later
/// acknowledgement removes those entries and nothing pushed afterwards.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    readings: Vec<Reading>,
    start_seq: u64,
    end_seq: u64,
}

impl BatchSnapshot {
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Sequence number one past the newest reading in the snapshot.
    pub fn end_seq(&self) -> u64 {
        self.end_seq
    }

    pub fn start_seq(&self) -> u64 {
        self.start_seq
    }
}

/// Size and capacity read under a single lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferState {
    pub size: usize,
    pub capacity: usize,
}

impl BufferState {
    pub fn occupancy_ratio(&self) -> f64 {
        self.size as f64 / self.capacity as f64
    }
}

struct BufferInner {
    entries: VecDeque<Reading>,
    // Sequence number of entries.front(); entry i has sequence front_seq + i
    front_seq: u64,
    // Set while occupancy is above PRESSURE_THRESHOLD
    under_pressure: bool,
    eviction_warned: bool,
}

/// Fixed-capacity FIFO of readings with drop-oldest eviction.
///
/// Every operation runs under one mutex, so concurrent ingestion and the
/// uploader never observe a half-applied change. Pushing never blocks on
/// capacity: a full buffer evicts its oldest entry instead.
pub struct ReadingBuffer {
    inner: RobustMutex<BufferInner>,
    capacity: usize,
    counters: BufferCounters,
}

impl ReadingBuffer {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        let inner = BufferInner {
            entries: VecDeque::with_capacity(capacity),
            front_seq: 0,
            under_pressure: false,
            eviction_warned: false,
        };

        Ok(Self {
            inner: RobustMutex::new(inner, "reading_buffer"),
            capacity,
            counters: BufferCounters::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a reading, evicting the oldest one first when full.
    ///
    /// Returns the evicted reading, if any.
    pub fn push(&self, reading: Reading) -> Option<Reading> {
        let mut inner = self.inner.lock_safe();

        let evicted = if inner.entries.len() >= self.capacity {
            let evicted = inner.entries.pop_front();
            inner.front_seq += 1;
            evicted
        } else {
            None
        };

        inner.entries.push_back(reading);
        let len = inner.entries.len();
        self.counters.record_push(len);

        let ratio = len as f64 / self.capacity as f64;
        if ratio > PRESSURE_THRESHOLD && !inner.under_pressure {
            inner.under_pressure = true;
            warn!(
                size = len,
                capacity = self.capacity,
                "Buffer occupancy above {:.0}%, oldest readings will be dropped if uploads keep failing",
                PRESSURE_THRESHOLD * 100.0
            );
        }

        if let Some(dropped) = &evicted {
            let total = self.counters.record_eviction();
            if !inner.eviction_warned {
                inner.eviction_warned = true;
                warn!(
                    device_id = %dropped.device_id,
                    evicted_total = total,
                    "Buffer full, evicted oldest reading"
                );
            } else {
                debug!(
                    device_id = %dropped.device_id,
                    evicted_total = total,
                    "Buffer full, evicted oldest reading"
                );
            }
        }

        evicted
    }

    /// Copy of up to `n` oldest readings; the buffer is left untouched.
    pub fn peek_batch(&self, n: usize) -> BatchSnapshot {
        let inner = self.inner.lock_safe();
        let readings: Vec<Reading> = inner.entries.iter().take(n).cloned().collect();
        let start_seq = inner.front_seq;

        BatchSnapshot {
            end_seq: start_seq + readings.len() as u64,
            start_seq,
            readings,
        }
    }

    /// Remove up to `k` oldest readings; `k` is clamped to the current size.
    ///
    /// Returns how many were removed.
    pub fn remove_front(&self, k: usize) -> usize {
        let mut inner = self.inner.lock_safe();
        let count = k.min(inner.entries.len());
        self.drain_front(&mut inner, count);
        drop(inner);

        self.counters.record_removal(count);
        count
    }

    /// Remove the readings of a delivered snapshot that are still buffered.
    ///
    /// Entries evicted since the snapshot are already gone and are not
    /// compensated for, so a reading pushed after the snapshot is never
    /// removed here.
    pub fn remove_acknowledged(&self, snapshot: &BatchSnapshot) -> usize {
        let mut inner = self.inner.lock_safe();
        let still_present = snapshot.end_seq.saturating_sub(inner.front_seq) as usize;
        let count = still_present.min(inner.entries.len());
        self.drain_front(&mut inner, count);
        drop(inner);

        self.counters.record_removal(count);
        count
    }

    fn drain_front(&self, inner: &mut BufferInner, count: usize) {
        inner.entries.drain(..count);
        inner.front_seq += count as u64;

        let ratio = inner.entries.len() as f64 / self.capacity as f64;
        if inner.under_pressure && ratio <= PRESSURE_THRESHOLD {
            inner.under_pressure = false;
            inner.eviction_warned = false;
            debug!(size = inner.entries.len(), "Buffer pressure relieved");
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock_safe().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn occupancy_ratio(&self) -> f64 {
        self.size() as f64 / self.capacity as f64
    }

    pub fn state(&self) -> BufferState {
        BufferState {
            size: self.size(),
            capacity: self.capacity,
        }
    }

    /// Copy of every buffered reading in insertion order.
    pub fn readings(&self) -> Vec<Reading> {
        self.inner.lock_safe().entries.iter().cloned().collect()
    }

    pub fn metrics(&self) -> BufferMetrics {
        self.counters.snapshot(self.capacity, self.size())
    }
}

impl std::fmt::Debug for ReadingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingBuffer")
            .field("capacity", &self.capacity)
            .field("metrics", &self.metrics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(i: usize) -> Reading {
        Reading::new(format!("sensor-{i}"), 60.0 + i as f64, 1_700_000_000.0 + i as f64)
    }

    fn device_ids(readings: &[Reading]) -> Vec<String> {
        readings.iter().map(|r| r.device_id.clone()).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            ReadingBuffer::new(0).unwrap_err(),
            BufferError::InvalidCapacity { capacity: 0 }
        );
    }

    #[test]
    fn test_peek_does_not_remove() {
        let buffer = ReadingBuffer::new(10).unwrap();
        for i in 0..4 {
            buffer.push(reading(i));
        }

        let snapshot = buffer.peek_batch(3);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(device_ids(snapshot.readings()), ["sensor-0", "sensor-1", "sensor-2"]);
        assert_eq!(buffer.size(), 4);

        // Asking for more than is buffered returns what is there
        assert_eq!(buffer.peek_batch(100).len(), 4);
    }

    #[test]
    fn test_remove_front_is_clamped() {
        let buffer = ReadingBuffer::new(5).unwrap();
        buffer.push(reading(0));
        buffer.push(reading(1));

        assert_eq!(buffer.remove_front(10), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.remove_front(1), 0);
    }

    #[test]
    fn test_push_reports_evicted_reading() {
        let buffer = ReadingBuffer::new(2).unwrap();
        assert!(buffer.push(reading(0)).is_none());
        assert!(buffer.push(reading(1)).is_none());

        let evicted = buffer.push(reading(2)).unwrap();
        assert_eq!(evicted.device_id, "sensor-0");
        assert_eq!(buffer.metrics().evicted, 1);
    }

    #[test]
    fn test_remove_acknowledged_skips_later_pushes() {
        let buffer = ReadingBuffer::new(10).unwrap();
        for i in 0..3 {
            buffer.push(reading(i));
        }

        let snapshot = buffer.peek_batch(5);
        buffer.push(reading(3));
        buffer.push(reading(4));

        assert_eq!(buffer.remove_acknowledged(&snapshot), 3);
        assert_eq!(device_ids(&buffer.readings()), ["sensor-3", "sensor-4"]);
    }

    #[test]
    fn test_remove_acknowledged_after_eviction() {
        let buffer = ReadingBuffer::new(4).unwrap();
        for i in 0..4 {
            buffer.push(reading(i));
        }

        let snapshot = buffer.peek_batch(3);
        // Evicts sensor-0 and sensor-1 while the batch is in flight
        buffer.push(reading(4));
        buffer.push(reading(5));

        // Only sensor-2 of the snapshot is still buffered
        assert_eq!(buffer.remove_acknowledged(&snapshot), 1);
        assert_eq!(device_ids(&buffer.readings()), ["sensor-3", "sensor-4", "sensor-5"]);
    }

    #[test]
    fn test_remove_acknowledged_twice_is_noop() {
        let buffer = ReadingBuffer::new(4).unwrap();
        buffer.push(reading(0));
        buffer.push(reading(1));

        let snapshot = buffer.peek_batch(2);
        assert_eq!(buffer.remove_acknowledged(&snapshot), 2);
        buffer.push(reading(2));
        assert_eq!(buffer.remove_acknowledged(&snapshot), 0);
        assert_eq!(buffer.size(), 1);
    }

    #[test]
    fn test_metrics_track_lifecycle() {
        let buffer = ReadingBuffer::new(3).unwrap();
        for i in 0..5 {
            buffer.push(reading(i));
        }
        buffer.remove_front(2);

        let metrics = buffer.metrics();
        assert_eq!(metrics.capacity, 3);
        assert_eq!(metrics.len, 1);
        assert_eq!(metrics.pushed, 5);
        assert_eq!(metrics.evicted, 2);
        assert_eq!(metrics.removed, 2);
        assert_eq!(metrics.peak_size, 3);
    }

    #[test]
    fn test_occupancy_ratio() {
        let buffer = ReadingBuffer::new(10).unwrap();
        assert_eq!(buffer.occupancy_ratio(), 0.0);
        for i in 0..9 {
            buffer.push(reading(i));
        }
        assert!((buffer.occupancy_ratio() - 0.9).abs() < f64::EPSILON);
        assert_eq!(buffer.state(), BufferState { size: 9, capacity: 10 });
    }
}
