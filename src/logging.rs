use serde::Deserialize;
use std::{fs::create_dir_all, path::PathBuf, str::FromStr};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub enabled: bool,
    pub logger_name: String,
    /// Directory for the rolling log files. Terminal-only logging when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enabled: true,
            logger_name: "grievance_classifier".to_string(),
            log_dir: Some(PathBuf::from("logs")),
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }

    pub fn level(&self) -> crate::Result<tracing::Level> {
        tracing::Level::from_str(self.level.trim())
            .map_err(|_| crate::anyhow!("invalid log level: {}", self.level))
    }

    /// Installs the process-wide subscriber. Call once, from the binary.
    pub fn load_logger(&self) -> crate::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let level = self.level()?;

        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let terminal_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr);

        let file_layer = match &self.log_dir {
            Some(log_dir) => {
                if !log_dir.exists() {
                    create_dir_all(log_dir).map_err(|e| {
                        crate::anyhow!(
                            "failed to create log directory {}: {e}",
                            log_dir.display()
                        )
                    })?;
                }
                let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(6)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(log_dir)?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(file_appender),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(terminal_layer)
            .with(file_layer)
            .try_init()
            .map_err(|e| crate::anyhow!("failed to install logger: {e}"))
    }
}
