pub mod config;
pub mod logging_system;
pub mod service;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel};
pub use logging_system::{LogDirective, LoggingError, LoggingSystem, setup_logging};
pub use service::{GatewayService, GatewayStatus, RunningGateway, ServiceError};

use clap::Parser;
use clap::error::ErrorKind;
use std::ffi::OsString;
use std::time::Duration;
use tracing::{error, info};

/// How long tasks get to wind down after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(4);

pub struct App {
    service: GatewayService,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, Box<dyn std::error::Error + Send + Sync>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        setup_logging(config.log_level, config.log_format)?;

        info!("Starting sensor-gateway v{}", env!("CARGO_PKG_VERSION"));
        if let Some(path) = &config.config_file {
            info!("Configuration loaded from {}", path.display());
        }

        let service = GatewayService::new(config)?;
        Ok(Self { service })
    }

    pub fn gateway_id(&self) -> &str {
        self.service.gateway_id()
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let gateway = self.service.start();

        info!("sensor-gateway is running. Press Ctrl+C to stop.");
        shutdown::cancel_on_signal(gateway.cancellation_token()).await;

        gateway.shutdown(SHUTDOWN_GRACE).await?;
        Ok(())
    }
}

// Main entry point for the application
pub async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args: Vec<OsString> = std::env::args_os().collect();

    // Handle --help / --version the way clap would, before any setup
    if let Err(e) = Config::try_parse_from(&args) {
        if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
            e.exit();
        }
    }

    let app = match App::from_args(args) {
        Ok(app) => app,
        Err(e) => {
            // Logging may not be up yet
            eprintln!("Configuration error: {e}");
            return Err(e);
        }
    };

    if let Err(e) = app.run().await {
        error!("Application error: {}", e);
        return Err(e);
    }

    Ok(())
}
