//! Recording subsystem doubles.
//!
//! Every double appends to a shared [`EventLog`] so tests can assert the
//! relative order of calls made across subsystems and threads.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::subsystems::{
    ConfigStore, ConfigSyncError, ContentDistribution, ServerControl, ServerNotifier,
    StartListener, SubsystemContext, SubsystemFactory, SubsystemKind, Subsystems,
};

use super::events::{EventLog, LifecycleEvent};

/// How the recording daemon behaves when run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announce {
    /// Keep the notifier and stay silent until [`RecordingServer::announce`].
    Never,
    /// Report readiness on the given endpoint immediately.
    At(SocketAddr),
    /// Report readiness without ever learning an endpoint.
    WithoutEndpoint,
}

/// Daemon controller double.
#[derive(Debug)]
pub struct RecordingServer {
    log: EventLog,
    mode: Announce,
    endpoint: Mutex<Option<SocketAddr>>,
    notifier: Mutex<Option<ServerNotifier>>,
    runs: AtomicUsize,
}

impl RecordingServer {
    /// Creates a controller with the given readiness behaviour.
    #[must_use]
    pub fn new(log: EventLog, mode: Announce) -> Self {
        Self {
            log,
            mode,
            endpoint: Mutex::new(None),
            notifier: Mutex::new(None),
            runs: AtomicUsize::new(0),
        }
    }

    /// Sets the endpoint and reports readiness through the stored notifier.
    ///
    /// Returns `false` when `run` has not been called yet.
    pub fn announce(&self, endpoint: SocketAddr) -> bool {
        self.set_endpoint(Some(endpoint));
        let notifier = self.notifier.lock().expect("notifier mutex poisoned");
        notifier.as_ref().map(ServerNotifier::server_started).is_some()
    }

    /// Overrides the reported endpoint.
    pub fn set_endpoint(&self, endpoint: Option<SocketAddr>) {
        *self.endpoint.lock().expect("endpoint mutex poisoned") = endpoint;
    }

    /// Number of times `run` was entered.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl StartListener for RecordingServer {
    fn on_start(&self) {
        self.log
            .record(LifecycleEvent::Started(SubsystemKind::Server));
    }
}

impl ServerControl for RecordingServer {
    fn set_instance_path(&self, path: &Path) {
        self.log
            .record(LifecycleEvent::InstancePathSet(path.to_path_buf()));
    }

    fn run(&self, notifier: ServerNotifier) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.notifier.lock().expect("notifier mutex poisoned") = Some(notifier.clone());
        self.log.record(LifecycleEvent::ServerRun);
        match self.mode {
            Announce::Never => {}
            Announce::At(endpoint) => {
                self.set_endpoint(Some(endpoint));
                notifier.server_started();
            }
            Announce::WithoutEndpoint => notifier.server_started(),
        }
    }

    fn listening_endpoint(&self) -> Option<SocketAddr> {
        *self.endpoint.lock().expect("endpoint mutex poisoned")
    }

    fn stop(&self) {
        self.log.record(LifecycleEvent::ServerStopped);
    }
}

/// Configuration store double.
#[derive(Debug)]
pub struct RecordingConfigStore {
    log: EventLog,
    fail_sync: AtomicBool,
}

impl RecordingConfigStore {
    /// Creates a store whose `sync` succeeds.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_sync: AtomicBool::new(false),
        }
    }

    /// Makes every later `sync` fail.
    pub fn fail_sync(&self) {
        self.fail_sync.store(true, Ordering::SeqCst);
    }
}

impl ConfigStore for RecordingConfigStore {
    fn set(&self, key: &str, value: &str) {
        self.log.record(LifecycleEvent::ConfigSet {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }

    fn sync(&self) -> Result<(), ConfigSyncError> {
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(ConfigSyncError::Write {
                path: PathBuf::from("serval.conf"),
                source: io::Error::other("deliberate sync failure"),
            });
        }
        self.log.record(LifecycleEvent::ConfigSynced);
        Ok(())
    }
}

/// Content store double.
#[derive(Debug)]
pub struct RecordingContent {
    log: EventLog,
}

impl RecordingContent {
    /// Creates a content store double.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl StartListener for RecordingContent {
    fn on_start(&self) {
        self.log
            .record(LifecycleEvent::Started(SubsystemKind::ContentDistribution));
    }
}

impl ContentDistribution for RecordingContent {
    fn update_configuration_from_storage_availability(&self) {
        self.log.record(LifecycleEvent::StorageChecked);
    }
}

/// Peer or identity registry double.
#[derive(Debug)]
pub struct RecordingRegistry {
    log: EventLog,
    kind: SubsystemKind,
}

impl RecordingRegistry {
    /// Creates a registry double reporting as `kind`.
    #[must_use]
    pub fn new(log: EventLog, kind: SubsystemKind) -> Self {
        Self { log, kind }
    }
}

impl StartListener for RecordingRegistry {
    fn on_start(&self) {
        self.log.record(LifecycleEvent::Started(self.kind));
    }
}

/// Factory handing out the same recording doubles on every build.
pub struct RecordingFactory {
    pub server: Arc<RecordingServer>,
    pub config: Arc<dyn ConfigStore>,
    pub content: Arc<RecordingContent>,
    pub peers: Arc<RecordingRegistry>,
    pub identities: Arc<RecordingRegistry>,
    instance_path: Mutex<Option<PathBuf>>,
}

impl RecordingFactory {
    /// Builds doubles sharing `log`, using `config` as the configuration store.
    #[must_use]
    pub fn new(log: &EventLog, mode: Announce, config: Arc<dyn ConfigStore>) -> Self {
        Self {
            server: Arc::new(RecordingServer::new(log.clone(), mode)),
            config,
            content: Arc::new(RecordingContent::new(log.clone())),
            peers: Arc::new(RecordingRegistry::new(log.clone(), SubsystemKind::Peers)),
            identities: Arc::new(RecordingRegistry::new(
                log.clone(),
                SubsystemKind::Identities,
            )),
            instance_path: Mutex::new(None),
        }
    }

    /// Instance path seen during the last build.
    #[must_use]
    pub fn built_for(&self) -> Option<PathBuf> {
        self.instance_path
            .lock()
            .expect("instance path mutex poisoned")
            .clone()
    }
}

impl SubsystemFactory for RecordingFactory {
    fn build(&self, context: &SubsystemContext<'_>) -> Subsystems {
        *self
            .instance_path
            .lock()
            .expect("instance path mutex poisoned") = Some(context.instance_path.to_path_buf());
        Subsystems {
            server: self.server.clone(),
            content: self.content.clone(),
            config: Arc::clone(&self.config),
            peers: self.peers.clone(),
            identities: self.identities.clone(),
        }
    }
}
