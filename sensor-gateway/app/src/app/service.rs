use super::Config;
use crate::{
    buffer::{BufferMetrics, ReadingBuffer},
    collector::{IngestCollector, IngestStats, MessageHandler, MqttConfig, MqttSubscriber},
    scheduler::FlushScheduler,
    sender::{ClientConfig, HttpEndpoint, UploadMetrics, UploadStats, Uploader},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::app::ConfigError),
    #[error("Buffer error: {0}")]
    BufferError(#[from] crate::buffer::BufferError),
    #[error("Sender error: {0}")]
    SenderError(#[from] crate::sender::ClientError),
    #[error("Shutdown timeout after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Point-in-time view of the whole pipeline.
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub gateway_id: String,
    pub uptime: Duration,
    pub buffer: BufferMetrics,
    pub ingest: IngestStats,
    pub upload: UploadMetrics,
}

/// Wires buffer, collector, scheduler and MQTT subscriber from a [`Config`].
pub struct GatewayService {
    config: Config,
    gateway_id: String,
    buffer: Arc<ReadingBuffer>,
    collector: Arc<IngestCollector>,
    uploader: Uploader<HttpEndpoint>,
}

impl GatewayService {
    pub fn new(config: Config) -> Result<Self, ServiceError> {
        config.validate()?;

        let gateway_id = config.resolve_gateway_id();
        let buffer = Arc::new(ReadingBuffer::new(config.buffer_capacity)?);
        let collector = Arc::new(IngestCollector::new(Arc::clone(&buffer)));

        let endpoint = HttpEndpoint::new(ClientConfig {
            endpoint: config.endpoint_url.clone(),
            timeout: config.request_timeout,
            api_key: config.endpoint_api_key.clone(),
            ..ClientConfig::default()
        })?;
        let uploader = Uploader::new(
            Arc::clone(&buffer),
            endpoint,
            gateway_id.clone(),
            config.batch_size,
        );

        if config.batch_exceeds_capacity() {
            warn!(
                batch_size = config.batch_size,
                capacity = config.buffer_capacity,
                "Batch size exceeds buffer capacity; flushes will be driven by occupancy and send interval"
            );
        }

        Ok(Self {
            config,
            gateway_id,
            buffer,
            collector,
            uploader,
        })
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    pub fn buffer(&self) -> &Arc<ReadingBuffer> {
        &self.buffer
    }

    pub fn collector(&self) -> &Arc<IngestCollector> {
        &self.collector
    }

    fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.config.mqtt_broker.clone(),
            port: self.config.mqtt_port,
            topic: self.config.mqtt_topic.clone(),
            shared_group: self.config.mqtt_shared_group.clone(),
            client_id: self.config.resolve_client_id(&self.gateway_id),
            ..MqttConfig::default()
        }
    }

    /// Spawn the scheduler and the subscriber. Both stop when the returned
    /// handle is shut down.
    pub fn start(self) -> RunningGateway {
        let cancel = CancellationToken::new();
        let upload_stats = self.uploader.stats_handle();
        let mqtt_config = self.mqtt_config();

        info!(
            gateway_id = %self.gateway_id,
            endpoint = %self.config.endpoint_url,
            capacity = self.config.buffer_capacity,
            batch_size = self.config.batch_size,
            "Starting sensor gateway"
        );

        let scheduler = FlushScheduler::new(
            self.uploader,
            self.config.send_interval,
            self.config.scheduler_tick,
        );
        let scheduler_task = tokio::spawn(scheduler.run(cancel.child_token()));

        let handler: Arc<dyn MessageHandler> = self.collector.clone();
        let subscriber = MqttSubscriber::new(mqtt_config, handler);
        let subscriber_task = tokio::spawn(subscriber.run(cancel.child_token()));

        RunningGateway {
            gateway_id: self.gateway_id,
            started_at: Instant::now(),
            buffer: self.buffer,
            collector: self.collector,
            upload_stats,
            cancel,
            tasks: vec![("scheduler", scheduler_task), ("subscriber", subscriber_task)],
        }
    }
}

pub struct RunningGateway {
    gateway_id: String,
    started_at: Instant,
    buffer: Arc<ReadingBuffer>,
    collector: Arc<IngestCollector>,
    upload_stats: Arc<UploadStats>,
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl RunningGateway {
    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            gateway_id: self.gateway_id.clone(),
            uptime: self.started_at.elapsed(),
            buffer: self.buffer.metrics(),
            ingest: self.collector.stats(),
            upload: self.upload_stats.snapshot(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop both tasks and wait up to `grace` for them to finish.
    pub async fn shutdown(mut self, grace: Duration) -> Result<GatewayStatus, ServiceError> {
        self.cancel.cancel();

        let tasks = std::mem::take(&mut self.tasks);
        let join_all = async {
            for (name, task) in tasks {
                if let Err(e) = task.await {
                    error!(task = name, "Task ended abnormally: {e}");
                }
            }
        };

        if tokio::time::timeout(grace, join_all).await.is_err() {
            error!("Shutdown timeout exceeded");
            return Err(ServiceError::ShutdownTimeout(grace));
        }

        let status = self.status();
        info!(
            gateway_id = %status.gateway_id,
            accepted = status.ingest.accepted,
            delivered = status.upload.readings_delivered,
            evicted = status.buffer.evicted,
            abandoned = status.buffer.len,
            "Gateway stopped"
        );
        Ok(status)
    }
}
