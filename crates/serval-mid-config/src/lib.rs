//! Shared configuration for the Serval mesh lifecycle orchestrator.
//!
//! Values are layered by [`ortho_config`]: built-in defaults first, then an
//! optional configuration file (`--config-path` or `SERVAL_MID_CONFIG_PATH`),
//! then `SERVAL_MID_*` environment variables, and finally command-line flags.
//! Later layers win.

mod defaults;
mod logging;
mod storage;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_POOL_KEEP_ALIVE_SECS, DEFAULT_POOL_MAX_WORKERS,
    DEFAULT_POOL_MIN_WORKERS, DEFAULT_SERVER_COMMAND, DEFAULT_SERVER_HTTP_PORT,
    DEFAULT_STARTUP_TIMEOUT_SECS, default_log_filter, default_log_format, default_storage_dir,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use storage::{StoragePaths, StoragePathsError};

/// Runtime configuration for the orchestrator binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SERVAL_MID")]
#[serde(default)]
pub struct Config {
    /// `tracing` filter expression, for example `info,serval_mid=debug`.
    pub log_filter: String,
    /// Output format of the log stream.
    pub log_format: LogFormat,
    /// Private storage directory of the application.
    pub storage_dir: Utf8PathBuf,
    /// Removable storage used for the content store, when present.
    pub content_dir: Option<Utf8PathBuf>,
    /// Executable started as the mesh daemon.
    pub server_command: String,
    /// Loopback port the daemon's RESTful API binds.
    pub server_http_port: u16,
    /// Seconds to wait for the daemon to come up; zero waits forever.
    pub startup_timeout_secs: u64,
    /// Minimum number of background worker threads.
    pub pool_min_workers: usize,
    /// Maximum number of background worker threads.
    pub pool_max_workers: usize,
    /// Idle timeout for workers above the minimum, in seconds.
    pub pool_keep_alive_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            storage_dir: default_storage_dir(),
            content_dir: None,
            server_command: DEFAULT_SERVER_COMMAND.to_owned(),
            server_http_port: DEFAULT_SERVER_HTTP_PORT,
            startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
            pool_min_workers: DEFAULT_POOL_MIN_WORKERS,
            pool_max_workers: DEFAULT_POOL_MAX_WORKERS,
            pool_keep_alive_secs: DEFAULT_POOL_KEEP_ALIVE_SECS,
        }
    }
}

impl Config {
    /// Filter expression handed to the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Selected log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Private storage directory whose parent hosts the instance directory.
    #[must_use]
    pub fn storage_dir(&self) -> &Utf8Path {
        self.storage_dir.as_path()
    }

    /// Content store location, if one was configured.
    #[must_use]
    pub fn content_dir(&self) -> Option<&Utf8Path> {
        self.content_dir.as_deref()
    }

    /// Daemon executable.
    #[must_use]
    pub fn server_command(&self) -> &str {
        self.server_command.as_str()
    }

    /// Port the daemon's RESTful API listens on.
    #[must_use]
    pub const fn server_http_port(&self) -> u16 {
        self.server_http_port
    }

    /// Deadline for the daemon to report readiness, if any.
    #[must_use]
    pub const fn startup_timeout(&self) -> Option<Duration> {
        if self.startup_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.startup_timeout_secs))
        }
    }

    /// Validated worker pool limits.
    pub fn pool_limits(&self) -> Result<PoolLimits, PoolLimitsError> {
        PoolLimits::new(
            self.pool_min_workers,
            self.pool_max_workers,
            Duration::from_secs(self.pool_keep_alive_secs),
        )
    }
}

/// Concurrency limits for the background worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    min_workers: usize,
    max_workers: usize,
    keep_alive: Duration,
}

impl PoolLimits {
    /// Validates and builds a set of limits.
    pub const fn new(
        min_workers: usize,
        max_workers: usize,
        keep_alive: Duration,
    ) -> Result<Self, PoolLimitsError> {
        if min_workers == 0 {
            return Err(PoolLimitsError::ZeroMinimum);
        }
        if max_workers < min_workers {
            return Err(PoolLimitsError::MaximumBelowMinimum {
                min: min_workers,
                max: max_workers,
            });
        }
        Ok(Self {
            min_workers,
            max_workers,
            keep_alive,
        })
    }

    /// Workers that never retire.
    #[must_use]
    pub const fn min_workers(&self) -> usize {
        self.min_workers
    }

    /// Hard ceiling on live workers.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Idle period after which surplus workers exit.
    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            min_workers: DEFAULT_POOL_MIN_WORKERS,
            max_workers: DEFAULT_POOL_MAX_WORKERS,
            keep_alive: Duration::from_secs(DEFAULT_POOL_KEEP_ALIVE_SECS),
        }
    }
}

/// Invalid worker pool limits.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PoolLimitsError {
    /// The pool needs at least one permanent worker.
    #[error("pool_min_workers must be at least 1")]
    ZeroMinimum,
    /// The ceiling sits below the floor.
    #[error("pool_max_workers ({max}) must not be below pool_min_workers ({min})")]
    MaximumBelowMinimum {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },
}
