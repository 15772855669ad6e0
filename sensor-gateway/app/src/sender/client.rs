use crate::domain::Batch;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use url::Url;

const BATCH_ID_HEADER: &str = "x-batch-id";
const API_KEY_HEADER: &str = "x-functions-key";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    /// Upper bound for one upload request, connect included
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
    /// Function key for endpoints deployed behind key authentication
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7071/api/iot-data".to_string(),
            timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(5),
            user_agent: format!("sensor-gateway/{}", env!("CARGO_PKG_VERSION")),
            api_key: None,
        }
    }
}

/// Remote side of an upload: accepts one batch, answers with a status code.
///
/// Only the status is consumed; any 2xx means the whole batch was accepted.
pub trait BatchEndpoint: Send + Sync {
    fn send_batch(
        &self,
        batch: &Batch,
    ) -> impl Future<Output = Result<StatusCode, ClientError>> + Send;
}

/// [`BatchEndpoint`] that POSTs the batch as JSON.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: Client,
    config: ClientConfig,
    url: Url,
    headers: HeaderMap,
}

impl HttpEndpoint {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let url: Url = config.endpoint.parse().map_err(|e| {
            ClientError::InvalidConfiguration(format!("Invalid endpoint URL: {e}"))
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(key).map_err(|e| {
                ClientError::InvalidConfiguration(format!("Invalid API key: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers.clone())
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            url,
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl BatchEndpoint for HttpEndpoint {
    async fn send_batch(&self, batch: &Batch) -> Result<StatusCode, ClientError> {
        let body = serde_json::to_vec(batch)?;

        let mut request = self.client.post(self.url.clone()).body(body);
        if let Ok(batch_id) = HeaderValue::from_str(batch.id()) {
            request = request.header(BATCH_ID_HEADER, batch_id);
        }

        let response = timeout(self.config.timeout, request.send())
            .await
            .map_err(|_| ClientError::RequestTimeout(self.config.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::RequestTimeout(self.config.timeout)
                } else {
                    ClientError::NetworkError(e)
                }
            })?;

        Ok(response.status())
    }
}
