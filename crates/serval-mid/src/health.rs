//! Structured health reporting for lifecycle events.

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use crate::errors::FatalError;
use crate::subsystems::SubsystemKind;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Steps of the startup sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartupStep {
    /// The daemon controller learnt its instance directory.
    InstancePath,
    /// The content store re-evaluated its storage.
    StorageAvailability,
    /// The API credential and daemon settings were staged.
    StageConfiguration,
    /// Staged settings were flushed to disk.
    SyncConfiguration,
    /// The daemon thread was spawned.
    LaunchServer,
}

impl fmt::Display for StartupStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InstancePath => "instance_path",
            Self::StorageAvailability => "storage_availability",
            Self::StageConfiguration => "stage_configuration",
            Self::SyncConfiguration => "sync_configuration",
            Self::LaunchServer => "launch_server",
        };
        formatter.write_str(label)
    }
}

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked after construction, once START has been enqueued.
    fn startup_queued(&self, instance_path: &Path);

    /// Invoked after each startup step completes.
    fn startup_step(&self, step: StartupStep);

    /// Invoked when a lifecycle failure is about to be escalated.
    fn startup_failed(&self, error: &FatalError);

    /// Invoked after the daemon thread is spawned.
    fn server_launched(&self, instance_path: &Path);

    /// Invoked once the ready client has been published.
    fn server_ready(&self, endpoint: SocketAddr);

    /// Invoked after a subsystem received its start notification.
    fn subsystem_started(&self, kind: SubsystemKind);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn startup_queued(&self, instance_path: &Path) {
        (**self).startup_queued(instance_path);
    }

    fn startup_step(&self, step: StartupStep) {
        (**self).startup_step(step);
    }

    fn startup_failed(&self, error: &FatalError) {
        (**self).startup_failed(error);
    }

    fn server_launched(&self, instance_path: &Path) {
        (**self).server_launched(instance_path);
    }

    fn server_ready(&self, endpoint: SocketAddr) {
        (**self).server_ready(endpoint);
    }

    fn subsystem_started(&self, kind: SubsystemKind) {
        (**self).subsystem_started(kind);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn startup_queued(&self, instance_path: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "startup_queued",
            instance = %instance_path.display(),
            "startup queued"
        );
    }

    fn startup_step(&self, step: StartupStep) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "startup_step",
            step = %step,
            "startup step completed"
        );
    }

    fn startup_failed(&self, error: &FatalError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "startup_failed",
            error = %error,
            "lifecycle failure"
        );
    }

    fn server_launched(&self, instance_path: &Path) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_launched",
            instance = %instance_path.display(),
            "daemon launched"
        );
    }

    fn server_ready(&self, endpoint: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "server_ready",
            endpoint = %endpoint,
            "daemon ready"
        );
    }

    fn subsystem_started(&self, kind: SubsystemKind) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "subsystem_started",
            subsystem = %kind,
            "subsystem started"
        );
    }
}
