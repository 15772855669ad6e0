//! Domain layer for sensor-gateway.
//!
//! - `Reading`: one device measurement, the unit the buffer stores
//! - `Batch`: the upload payload built from the oldest buffered readings

pub mod batch;
pub mod reading;

pub use batch::{Batch, epoch_seconds_now};
pub use reading::Reading;
