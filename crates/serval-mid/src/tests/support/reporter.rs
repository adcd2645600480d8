//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::FatalError;
use crate::health::{HealthReporter, StartupStep};
use crate::subsystems::SubsystemKind;

/// Structured health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// START was queued for the given instance.
    StartupQueued(PathBuf),
    /// A startup step completed.
    Step(StartupStep),
    /// A lifecycle failure with its rendered message.
    Failed(String),
    /// The daemon thread was spawned.
    ServerLaunched,
    /// The client was published for the endpoint.
    ServerReady(SocketAddr),
    /// A subsystem was notified.
    SubsystemStarted(SubsystemKind),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Completed startup steps, in order.
    #[must_use]
    pub fn steps(&self) -> Vec<StartupStep> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::Step(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn startup_queued(&self, instance_path: &Path) {
        self.record(HealthEvent::StartupQueued(instance_path.to_path_buf()));
    }

    fn startup_step(&self, step: StartupStep) {
        self.record(HealthEvent::Step(step));
    }

    fn startup_failed(&self, error: &FatalError) {
        self.record(HealthEvent::Failed(error.to_string()));
    }

    fn server_launched(&self, _instance_path: &Path) {
        self.record(HealthEvent::ServerLaunched);
    }

    fn server_ready(&self, endpoint: SocketAddr) {
        self.record(HealthEvent::ServerReady(endpoint));
    }

    fn subsystem_started(&self, kind: SubsystemKind) {
        self.record(HealthEvent::SubsystemStarted(kind));
    }
}
