pub mod bounded;
pub mod concurrency;
pub mod error;
pub mod metrics;

pub use bounded::{BatchSnapshot, BufferState, PRESSURE_THRESHOLD, ReadingBuffer};
pub use concurrency::RobustMutex;
pub use error::BufferError;
pub use metrics::BufferMetrics;
