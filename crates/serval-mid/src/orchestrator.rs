//! Lifecycle orchestration for the mesh daemon and its dependants.
//!
//! The orchestrator owns every subsystem and drives one startup sequence:
//! it configures and launches the daemon on the lifecycle thread, waits for
//! the daemon to report readiness, publishes the API client exactly once and
//! then tells dependent subsystems to start. Construction returns as soon as
//! the START message is queued.
//!
//! Lifecycle messages run strictly one at a time, so startup steps never
//! interleave with readiness handling. Everything else goes to the worker
//! pool and runs concurrently.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serval_mid_config::{PoolLimits, StoragePaths};
use tracing::debug;

use crate::client::{ClientGate, RestfulClient};
use crate::credential::Credential;
use crate::errors::{FatalError, OrchestratorError};
use crate::fatal::FatalPolicy;
use crate::health::{HealthReporter, StartupStep};
use crate::lease::ResourceLease;
use crate::sequencer::{
    LifecycleMessage, MessageHandler, MessageSequencer, MessageTag, SEQUENCER_THREAD,
    SequencerState,
};
use crate::subsystems::{
    ServerNotifier, StartListener, SubsystemContext, SubsystemFactory, SubsystemKind, Subsystems,
};
use crate::worker_pool::WorkerPool;

const ORCHESTRATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::orchestrator");

/// User name the application authenticates as against the daemon API.
pub const RESTFUL_USERNAME: &str = "ServalDClient";

/// Name of the daemon instance directory, created beside private storage.
pub const INSTANCE_DIR: &str = "instance";

/// Network interfaces the daemon binds to.
pub const INTERFACE_MATCH: &str = "eth0,tiwlan0,wlan0,wl0.1,tiap0";

/// Name of the thread running the daemon.
pub const SERVER_THREAD: &str = "servald";

const PASSWORD_KEY: &str = "api.restful.users.ServalDClient.password";
const INTERFACE_MATCH_KEY: &str = "interfaces.0.match";
const DEFAULT_ROUTE_KEY: &str = "interfaces.0.default_route";
const ENABLE_INET_KEY: &str = "mdp.enable_inet";

/// Application environment the orchestrator is constructed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    files_dir: PathBuf,
}

impl AppContext {
    /// Creates a context around the application's private storage directory.
    #[must_use]
    pub fn new(files_dir: impl Into<PathBuf>) -> Self {
        Self {
            files_dir: files_dir.into(),
        }
    }

    /// Creates a context from resolved storage locations.
    #[must_use]
    pub fn from_storage(paths: &StoragePaths) -> Self {
        Self::new(paths.files_dir())
    }

    /// Private storage directory.
    #[must_use]
    pub fn files_dir(&self) -> &Path {
        self.files_dir.as_path()
    }
}

/// Collaborators injected at construction.
pub struct OrchestratorDeps<'a> {
    /// Builds the subsystem set.
    pub factory: &'a dyn SubsystemFactory,
    /// Receives lifecycle health events.
    pub reporter: Arc<dyn HealthReporter>,
    /// Handles unrecoverable lifecycle failures.
    pub fatal_policy: Arc<dyn FatalPolicy>,
}

/// Owner of the daemon lifecycle and the ready API client.
pub struct Orchestrator {
    instance_path: PathBuf,
    credential: OnceCell<Credential>,
    subsystems: Subsystems,
    client: Arc<ClientGate>,
    pool: WorkerPool,
    sequencer: MessageSequencer,
    lease: ResourceLease,
    server_launched: AtomicBool,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Orchestrator")
            .field("instance_path", &self.instance_path)
            .field("ready", &self.client.get().is_some())
            .field("sequencer", &self.sequencer.state())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds the subsystems, starts the lifecycle thread and queues startup.
    ///
    /// Returns before the daemon is configured; failures after this point
    /// are escalated through the fatal policy.
    pub fn new(
        context: &AppContext,
        limits: PoolLimits,
        deps: OrchestratorDeps<'_>,
    ) -> Result<Arc<Self>, FatalError> {
        let instance_path = instance_path_for(context.files_dir())?;
        let sequencer = MessageSequencer::new();
        let pool = WorkerPool::new(limits);
        let client = Arc::new(ClientGate::new());
        let subsystems = deps.factory.build(&SubsystemContext {
            instance_path: &instance_path,
            pool: &pool,
            client: &client,
        });

        let orchestrator = Arc::new(Self {
            instance_path,
            credential: OnceCell::new(),
            subsystems,
            client,
            pool,
            sequencer,
            lease: ResourceLease::new(),
            server_launched: AtomicBool::new(false),
            reporter: Arc::clone(&deps.reporter),
        });

        let handler = LifecycleHandler {
            orchestrator: Arc::downgrade(&orchestrator),
        };
        let policy = Arc::new(ReportingFatalPolicy {
            reporter: deps.reporter,
            inner: deps.fatal_policy,
        });
        orchestrator
            .sequencer
            .start(handler, policy)
            .map_err(|source| FatalError::SpawnThread {
                name: SEQUENCER_THREAD,
                source,
            })?;
        orchestrator.sequencer.post(MessageTag::Start, 0);
        orchestrator
            .reporter
            .startup_queued(&orchestrator.instance_path);
        Ok(orchestrator)
    }

    /// Directory holding the daemon's runtime state.
    #[must_use]
    pub fn instance_path(&self) -> &Path {
        self.instance_path.as_path()
    }

    /// Returns the API client once the daemon has reported readiness.
    pub fn client(&self) -> Result<&RestfulClient, OrchestratorError> {
        self.client.get().ok_or(OrchestratorError::ClientNotReady)
    }

    /// Blocks until the API client is published or `timeout` elapses.
    pub fn wait_for_client(&self, timeout: Duration) -> Result<&RestfulClient, OrchestratorError> {
        self.client
            .wait(timeout)
            .ok_or(OrchestratorError::ReadyTimeout { waited: timeout })
    }

    /// Runs `task` on the worker pool.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.execute(task);
    }

    /// Runs a fallible `task` on the worker pool; errors are logged.
    pub fn submit<F, E>(&self, task: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Display,
    {
        self.pool.submit(task);
    }

    /// Background worker pool shared with the subsystems.
    #[must_use]
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Requests that background activity stays awake for at least `hold`.
    ///
    /// Requests made while another is waiting collapse into the latest one.
    pub fn acquire_resource(&self, hold: Duration) {
        let hold_ms = i64::try_from(hold.as_millis()).unwrap_or(i64::MAX);
        self.sequencer.post(MessageTag::AcquireResource, hold_ms);
    }

    /// Returns `true` while a keep-awake request is in effect.
    #[must_use]
    pub fn resource_held(&self) -> bool {
        self.lease.is_held()
    }

    /// Time left on the keep-awake lease.
    #[must_use]
    pub fn resource_remaining(&self) -> Duration {
        self.lease.remaining()
    }

    /// Current state of the lifecycle thread.
    #[must_use]
    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Blocks until no lifecycle message is waiting or running.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        self.sequencer.wait_settled(timeout)
    }

    /// Stops the daemon. A START still queued or processed afterwards does not
    /// launch it again.
    pub fn shutdown(&self) {
        self.server_launched.store(true, Ordering::Release);
        self.subsystems.server.stop();
    }

    /// Publishes the API client and starts dependent subsystems.
    ///
    /// Only the first successful call has an effect; later calls return
    /// without rebuilding the client or notifying anyone again.
    pub fn on_server_started(&self) -> Result<(), FatalError> {
        if self.client.get().is_some() {
            debug!(
                target: ORCHESTRATOR_TARGET,
                "daemon readiness already handled"
            );
            return Ok(());
        }
        let endpoint = self
            .subsystems
            .server
            .listening_endpoint()
            .ok_or(FatalError::MissingEndpoint)?;
        let credential = self
            .credential
            .get()
            .ok_or(FatalError::MissingCredential)?;
        let client = RestfulClient::new(endpoint, RESTFUL_USERNAME, credential)
            .map_err(|source| FatalError::ClientConstruction { source })?;
        if !self.client.publish(client) {
            return Ok(());
        }
        self.reporter.server_ready(endpoint);

        for kind in SubsystemKind::NOTIFICATION_ORDER {
            self.listener(kind).on_start();
            self.reporter.subsystem_started(kind);
        }
        Ok(())
    }

    fn listener(&self, kind: SubsystemKind) -> &dyn StartListener {
        match kind {
            SubsystemKind::Identities => self.subsystems.identities.as_ref(),
            SubsystemKind::Peers => self.subsystems.peers.as_ref(),
            SubsystemKind::ContentDistribution => self.subsystems.content.as_ref(),
            SubsystemKind::Server => self.subsystems.server.as_ref(),
        }
    }

    fn handle(&self, message: LifecycleMessage) -> Result<(), FatalError> {
        match message.tag {
            MessageTag::Start => self.start_up(),
            MessageTag::AcquireResource => {
                self.lease.extend(message.arg);
                Ok(())
            }
            MessageTag::ServerUp => self.on_server_started(),
        }
    }

    fn start_up(&self) -> Result<(), FatalError> {
        self.subsystems
            .server
            .set_instance_path(&self.instance_path);
        self.reporter.startup_step(StartupStep::InstancePath);

        self.subsystems
            .content
            .update_configuration_from_storage_availability();
        self.reporter.startup_step(StartupStep::StorageAvailability);

        let credential = self
            .credential
            .get_or_try_init(Credential::generate)
            .map_err(|source| FatalError::Credential { source })?;
        let config = self.subsystems.config.as_ref();
        config.set(PASSWORD_KEY, credential.expose());
        config.set(INTERFACE_MATCH_KEY, INTERFACE_MATCH);
        config.set(DEFAULT_ROUTE_KEY, "on");
        config.set(ENABLE_INET_KEY, "on");
        self.reporter.startup_step(StartupStep::StageConfiguration);

        config
            .sync()
            .map_err(|source| FatalError::ConfigSync { source })?;
        self.reporter.startup_step(StartupStep::SyncConfiguration);

        self.launch_server()
    }

    fn launch_server(&self) -> Result<(), FatalError> {
        if self.server_launched.swap(true, Ordering::AcqRel) {
            debug!(
                target: ORCHESTRATOR_TARGET,
                "daemon already launched; skipping"
            );
            return Ok(());
        }
        let server = Arc::clone(&self.subsystems.server);
        let notifier = ServerNotifier::new(self.sequencer.poster());
        let spawned = thread::Builder::new()
            .name(SERVER_THREAD.to_owned())
            .spawn(move || server.run(notifier));
        if let Err(source) = spawned {
            self.server_launched.store(false, Ordering::Release);
            return Err(FatalError::SpawnThread {
                name: SERVER_THREAD,
                source,
            });
        }
        self.reporter.server_launched(&self.instance_path);
        self.reporter.startup_step(StartupStep::LaunchServer);
        Ok(())
    }
}

/// Derives `<parent of files_dir>/instance`.
fn instance_path_for(files_dir: &Path) -> Result<PathBuf, FatalError> {
    files_dir
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(|parent| parent.join(INSTANCE_DIR))
        .ok_or_else(|| FatalError::InstancePath {
            storage_dir: files_dir.to_path_buf(),
        })
}

/// Routes lifecycle messages to the orchestrator while it is alive.
struct LifecycleHandler {
    orchestrator: Weak<Orchestrator>,
}

impl MessageHandler for LifecycleHandler {
    fn handle(&self, message: LifecycleMessage) -> Result<(), FatalError> {
        match self.orchestrator.upgrade() {
            Some(orchestrator) => orchestrator.handle(message),
            None => Ok(()),
        }
    }
}

/// Reports a failure to health observers before escalating it.
struct ReportingFatalPolicy {
    reporter: Arc<dyn HealthReporter>,
    inner: Arc<dyn FatalPolicy>,
}

impl FatalPolicy for ReportingFatalPolicy {
    fn escalate(&self, error: &FatalError) {
        self.reporter.startup_failed(error);
        self.inner.escalate(error);
    }
}
