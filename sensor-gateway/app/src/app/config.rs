use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::EnvError(format!("Invalid log level: {s}"))),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// MQTT broker host
    #[arg(long, env = "MQTT_BROKER", default_value = "mqtt")]
    pub mqtt_broker: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value = "1883")]
    pub mqtt_port: u16,

    /// Topic the devices publish readings on
    #[arg(long, env = "MQTT_TOPIC", default_value = "sensors/temperature")]
    pub mqtt_topic: String,

    /// Shared-subscription group, so several gateways split one topic
    #[arg(long, env = "MQTT_SHARED_GROUP")]
    pub mqtt_shared_group: Option<String>,

    /// MQTT client id (defaults to "gateway-<gateway id>")
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub mqtt_client_id: Option<String>,

    /// Maximum number of readings held in memory
    #[arg(long, env = "BUFFER_CAPACITY", default_value = "200")]
    pub buffer_capacity: usize,

    /// Ingestion endpoint URL
    #[arg(
        long,
        env = "ENDPOINT_URL",
        default_value = "http://localhost:7071/api/iot-data"
    )]
    pub endpoint_url: String,

    /// Function key sent with every upload
    #[arg(long, env = "ENDPOINT_API_KEY", hide_env_values = true)]
    pub endpoint_api_key: Option<String>,

    /// Readings per upload
    #[arg(long, env = "BATCH_SIZE", default_value = "50")]
    pub batch_size: usize,

    /// Longest a reading may wait before a partial batch is sent, in seconds
    #[arg(long, env = "SEND_INTERVAL_SECS", default_value = "10")]
    pub send_interval_secs: f64,

    /// Scheduler evaluation period in seconds
    #[arg(long, env = "SCHEDULER_TICK_SECS", default_value = "0.5")]
    pub scheduler_tick_secs: f64,

    /// Upload request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "10")]
    pub request_timeout_secs: f64,

    /// Gateway identifier sent with each batch (defaults to the host name)
    #[arg(long, env = "GATEWAY_ID")]
    pub gateway_id: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,

    /// Configuration file path (optional)
    #[arg(long, env = "CONFIG_FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Derived fields (not CLI arguments)
    #[serde(skip)]
    #[arg(skip)]
    pub send_interval: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub scheduler_tick: Duration,

    #[serde(skip)]
    #[arg(skip)]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_broker: "mqtt".to_string(),
            mqtt_port: 1883,
            mqtt_topic: "sensors/temperature".to_string(),
            mqtt_shared_group: None,
            mqtt_client_id: None,
            buffer_capacity: 200,
            endpoint_url: "http://localhost:7071/api/iot-data".to_string(),
            endpoint_api_key: None,
            batch_size: 50,
            send_interval_secs: 10.0,
            scheduler_tick_secs: 0.5,
            request_timeout_secs: 10.0,
            gateway_id: None,
            log_level: LogLevel::Info,
            log_format: LogFormat::Compact,
            config_file: None,
            send_interval: Duration::from_secs(10),
            scheduler_tick: crate::scheduler::DEFAULT_TICK,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Parse CLI arguments; clap falls back to the environment for each flag.
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut config = Config::try_parse_from(args)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        if let Some(path) = config.config_file.clone() {
            config = Self::from_file(path)?;
        }

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    /// Build from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        load_env_string("MQTT_BROKER", &mut config.mqtt_broker);
        load_env_var("MQTT_PORT", &mut config.mqtt_port)?;
        load_env_string("MQTT_TOPIC", &mut config.mqtt_topic);
        load_env_string_opt("MQTT_SHARED_GROUP", &mut config.mqtt_shared_group);
        load_env_string_opt("MQTT_CLIENT_ID", &mut config.mqtt_client_id);
        load_env_var("BUFFER_CAPACITY", &mut config.buffer_capacity)?;
        load_env_string("ENDPOINT_URL", &mut config.endpoint_url);
        load_env_string_opt("ENDPOINT_API_KEY", &mut config.endpoint_api_key);
        load_env_var("BATCH_SIZE", &mut config.batch_size)?;
        load_env_var("SEND_INTERVAL_SECS", &mut config.send_interval_secs)?;
        load_env_var("SCHEDULER_TICK_SECS", &mut config.scheduler_tick_secs)?;
        load_env_var("REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs)?;
        load_env_string_opt("GATEWAY_ID", &mut config.gateway_id);
        load_env_var("LOG_LEVEL", &mut config.log_level)?;

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::EnvError(format!(
                        "Invalid LOG_FORMAT: {format}. Valid values: compact, json"
                    )));
                }
            };
        }

        if let Ok(path) = std::env::var("CONFIG_FILE") {
            return Self::from_file(path);
        }

        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file = Some(path.as_ref().to_path_buf());
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.send_interval = seconds_to_duration("send interval", self.send_interval_secs)?;
        self.scheduler_tick = seconds_to_duration("scheduler tick", self.scheduler_tick_secs)?;
        self.request_timeout =
            seconds_to_duration("request timeout", self.request_timeout_secs)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint_url).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid endpoint URL '{}': {}",
                self.endpoint_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Endpoint URL must use http or https: '{}'",
                self.endpoint_url
            )));
        }

        if self.mqtt_broker.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "MQTT broker must not be empty".to_string(),
            ));
        }

        if self.mqtt_port == 0 {
            return Err(ConfigError::InvalidConfig(
                "MQTT port must be greater than 0".to_string(),
            ));
        }

        if self.mqtt_topic.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "MQTT topic must not be empty".to_string(),
            ));
        }

        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "Buffer capacity must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.scheduler_tick.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Scheduler tick must be greater than 0".to_string(),
            ));
        }

        if self.send_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Send interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured gateway id, or the host name when none was given.
    pub fn resolve_gateway_id(&self) -> String {
        if let Some(id) = &self.gateway_id {
            return id.clone();
        }

        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "gateway_unknown".to_string())
    }

    pub fn resolve_client_id(&self, gateway_id: &str) -> String {
        self.mqtt_client_id
            .clone()
            .unwrap_or_else(|| format!("gateway-{gateway_id}"))
    }

    /// Batch size above capacity means only the occupancy and time rules can fire.
    pub fn batch_exceeds_capacity(&self) -> bool {
        self.batch_size > self.buffer_capacity
    }
}

fn seconds_to_duration(name: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ConfigError::InvalidConfig(format!("Invalid {name} '{secs}': {e}")))
}

/// Helper function to load and parse an environment variable.
/// Returns Ok(()) if the variable doesn't exist (keeps default).
fn load_env_var<T>(name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(name) {
        *target = value
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {name}: {e}")))?;
    }
    Ok(())
}

/// Helper function to load an optional string environment variable.
fn load_env_string_opt(name: &str, target: &mut Option<String>) {
    if let Ok(value) = std::env::var(name) {
        *target = Some(value);
    }
}

/// Helper function to load a string environment variable.
fn load_env_string(name: &str, target: &mut String) {
    if let Ok(value) = std::env::var(name) {
        *target = value;
    }
}
