//! Builds orchestrators wired to recording doubles.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serval_mid_config::PoolLimits;
use tempfile::TempDir;

use crate::orchestrator::{AppContext, INSTANCE_DIR, Orchestrator, OrchestratorDeps};
use crate::subsystems::ConfigStore;

use super::doubles::{Announce, RecordingConfigStore, RecordingFactory};
use super::events::EventLog;
use super::fatal::RecordingFatalPolicy;
use super::reporter::RecordingHealthReporter;

/// Upper bound for any wait in the suites.
pub const WAIT: Duration = Duration::from_secs(5);

/// Loopback socket address on `port`.
#[must_use]
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// Doubles and collaborators for one orchestrator under test.
pub struct Harness {
    temp: TempDir,
    pub log: EventLog,
    pub store: Arc<RecordingConfigStore>,
    pub factory: RecordingFactory,
    pub reporter: Arc<RecordingHealthReporter>,
    pub fatal: Arc<RecordingFatalPolicy>,
}

impl Harness {
    /// Harness whose configuration store is the recording double.
    #[must_use]
    pub fn new(mode: Announce) -> Self {
        let log = EventLog::default();
        let store = Arc::new(RecordingConfigStore::new(log.clone()));
        let config: Arc<dyn ConfigStore> = store.clone();
        Self::assemble(log, store, mode, config)
    }

    /// Harness using a caller-supplied configuration store.
    #[must_use]
    pub fn with_config_store(mode: Announce, config: Arc<dyn ConfigStore>) -> Self {
        let log = EventLog::default();
        let store = Arc::new(RecordingConfigStore::new(log.clone()));
        Self::assemble(log, store, mode, config)
    }

    fn assemble(
        log: EventLog,
        store: Arc<RecordingConfigStore>,
        mode: Announce,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            temp: TempDir::new().expect("temp dir"),
            factory: RecordingFactory::new(&log, mode, config),
            log,
            store,
            reporter: Arc::new(RecordingHealthReporter::default()),
            fatal: Arc::new(RecordingFatalPolicy::default()),
        }
    }

    /// Application context rooted in the harness temp directory.
    #[must_use]
    pub fn context(&self) -> AppContext {
        AppContext::new(self.temp.path().join("app").join("files"))
    }

    /// Instance directory the orchestrator is expected to derive.
    #[must_use]
    pub fn expected_instance_path(&self) -> PathBuf {
        self.temp.path().join("app").join(INSTANCE_DIR)
    }

    /// Collaborators for [`Orchestrator::new`].
    #[must_use]
    pub fn deps(&self) -> OrchestratorDeps<'_> {
        OrchestratorDeps {
            factory: &self.factory,
            reporter: self.reporter.clone(),
            fatal_policy: self.fatal.clone(),
        }
    }

    /// Constructs an orchestrator with default pool limits.
    #[must_use]
    pub fn start(&self) -> Arc<Orchestrator> {
        Orchestrator::new(&self.context(), PoolLimits::default(), self.deps())
            .expect("orchestrator construction succeeds")
    }
}
