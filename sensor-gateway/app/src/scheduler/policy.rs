use crate::buffer::{BufferState, PRESSURE_THRESHOLD};
use std::time::Duration;

/// Which clause of the flush rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// Enough readings for a full batch
    BatchSize,
    /// Buffer close to evicting
    Occupancy,
    /// Readings waited at least one send interval
    Staleness,
}

/// Decides, from buffer state alone, whether the current tick should flush.
///
/// Clauses are checked in order; the first one that holds is reported.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushPolicy {
    pub batch_size: usize,
    pub send_interval: Duration,
    pub occupancy_threshold: f64,
}

impl FlushPolicy {
    pub fn new(batch_size: usize, send_interval: Duration) -> Self {
        Self {
            batch_size,
            send_interval,
            occupancy_threshold: PRESSURE_THRESHOLD,
        }
    }

    pub fn evaluate(&self, state: BufferState, since_last_flush: Duration) -> Option<FlushTrigger> {
        if state.size >= self.batch_size {
            Some(FlushTrigger::BatchSize)
        } else if state.occupancy_ratio() > self.occupancy_threshold {
            Some(FlushTrigger::Occupancy)
        } else if state.size > 0 && since_last_flush >= self.send_interval {
            Some(FlushTrigger::Staleness)
        } else {
            None
        }
    }

    pub fn should_flush(&self, state: BufferState, since_last_flush: Duration) -> bool {
        self.evaluate(state, since_last_flush).is_some()
    }
}
