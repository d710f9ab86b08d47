use std::path::PathBuf;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{GatewayError, Result};

const DEFAULT_MAX_LOG_FILES: usize = 5;
const DEFAULT_FILTER: &str = "info";
const LOG_FILE_PREFIX: &str = "bitbucket_gateway";

/// Daily-rotated log files written off the request path.
pub struct FileLogger {
    log_directory: PathBuf,
    max_files: usize,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            max_files: DEFAULT_MAX_LOG_FILES,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn setup_file_logging(&self) -> Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(self.rotation.clone())
            .filename_prefix(LOG_FILE_PREFIX)
            .max_log_files(self.max_files)
            .build(&self.log_directory)
            .map_err(|e| {
                GatewayError::ConfigError(format!(
                    "Failed to create log file in {:?}: {}",
                    self.log_directory, e
                ))
            })?;

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Installs the global subscriber: console output always, plus files when a
/// log directory is configured. Keep the returned guard alive for the life of
/// the process so buffered file output is flushed.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match &config.directory {
        Some(directory) => {
            let file_logger = FileLogger::new(directory.clone())
                .with_max_files(config.max_files.unwrap_or(DEFAULT_MAX_LOG_FILES));
            let (file_writer, guard) = file_logger.setup_file_logging()?;

            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer()) // Console output
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file_writer)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logger_creates_directory() {
        let dir = std::env::temp_dir().join(format!("gateway-logs-{}", uuid::Uuid::now_v7()));
        let logger = FileLogger::new(dir.clone())
            .with_max_files(2)
            .with_rotation(Rotation::NEVER);

        let (_writer, guard) = logger.setup_file_logging().unwrap();
        assert!(dir.is_dir());

        drop(guard);
        std::fs::remove_dir_all(dir).ok();
    }
}
