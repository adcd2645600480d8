//! Defines the error surface of the process entry point.

use std::sync::Arc;

use ortho_config::OrthoError;
use serval_mid_config::{PoolLimitsError, StoragePathsError};
use thiserror::Error;

use crate::errors::OrchestratorError;
use crate::registry::RegistryError;
use crate::telemetry::TelemetryError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the orchestrator process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The storage directories could not be prepared.
    #[error("failed to prepare storage: {source}")]
    Storage {
        /// Underlying storage error.
        #[source]
        source: StoragePathsError,
    },
    /// The worker pool limits are inconsistent.
    #[error("invalid worker pool limits: {source}")]
    PoolLimits {
        /// Underlying validation error.
        #[source]
        source: PoolLimitsError,
    },
    /// The orchestrator could not be started.
    #[error("failed to start orchestrator: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The daemon did not become ready in time.
    #[error("daemon did not become ready: {source}")]
    Ready {
        /// Underlying readiness error.
        #[source]
        source: OrchestratorError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<TelemetryError> for LaunchError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<StoragePathsError> for LaunchError {
    fn from(source: StoragePathsError) -> Self {
        Self::Storage { source }
    }
}

impl From<PoolLimitsError> for LaunchError {
    fn from(source: PoolLimitsError) -> Self {
        Self::PoolLimits { source }
    }
}

impl From<RegistryError> for LaunchError {
    fn from(source: RegistryError) -> Self {
        Self::Registry { source }
    }
}

impl From<OrchestratorError> for LaunchError {
    fn from(source: OrchestratorError) -> Self {
        Self::Ready { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}
