pub mod client;
pub mod stats;
pub mod uploader;

pub use client::{BatchEndpoint, ClientConfig, ClientError, HttpEndpoint};
pub use stats::{UploadMetrics, UploadStats};
pub use uploader::{FlushOutcome, UploadError, Uploader};
