//! Contracts for the subsystems the orchestrator owns.
//!
//! The orchestrator only sequences these collaborators; what they do
//! internally belongs to the mesh daemon and the application. Each contract
//! is a narrow trait so tests can substitute recording doubles, and
//! [`ServalSubsystems`] wires the production implementations.

mod config_store;
mod content;
mod production;
mod registries;
mod server;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::client::ClientGate;
use crate::sequencer::{MessagePoster, MessageTag};
use crate::worker_pool::WorkerPool;

pub use config_store::ServalConfigFile;
pub use content::Rhizome;
pub use production::ServalSubsystems;
pub use registries::{Identities, KnownPeers};
pub use server::{DaemonServer, INSTANCE_PATH_ENV};

/// Subsystems notified once the daemon is ready, in notification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    /// Local identity registry.
    Identities,
    /// Registry of reachable peers.
    Peers,
    /// Content distribution store.
    ContentDistribution,
    /// The daemon controller itself.
    Server,
}

impl SubsystemKind {
    /// Order in which subsystems receive the start notification.
    pub const NOTIFICATION_ORDER: [Self; 4] = [
        Self::Identities,
        Self::Peers,
        Self::ContentDistribution,
        Self::Server,
    ];
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Identities => "identities",
            Self::Peers => "peers",
            Self::ContentDistribution => "content",
            Self::Server => "server",
        };
        formatter.write_str(label)
    }
}

/// Error returned when parsing a subsystem kind fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported subsystem kind: {0}")]
pub struct SubsystemKindParseError(String);

impl FromStr for SubsystemKind {
    type Err = SubsystemKindParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "identities" => Ok(Self::Identities),
            "peers" => Ok(Self::Peers),
            "content" => Ok(Self::ContentDistribution),
            "server" => Ok(Self::Server),
            other => Err(SubsystemKindParseError(other.to_owned())),
        }
    }
}

/// Receives the one-time notification that the daemon is ready.
///
/// Implementations must return promptly: anything slow belongs on the
/// worker pool.
pub trait StartListener: Send + Sync {
    /// Called once after the ready client has been published.
    fn on_start(&self);
}

/// Control surface of the external mesh daemon.
pub trait ServerControl: StartListener {
    /// Records the directory the daemon uses for its runtime state.
    fn set_instance_path(&self, path: &Path);

    /// Runs the daemon until it exits. Called on a dedicated thread.
    ///
    /// Implementations call [`ServerNotifier::server_started`] once the
    /// daemon accepts connections.
    fn run(&self, notifier: ServerNotifier);

    /// Address the daemon listens on, once known.
    fn listening_endpoint(&self) -> Option<SocketAddr>;

    /// Terminates the daemon and makes [`Self::run`] return.
    ///
    /// A daemon that has not been launched yet is never launched afterwards.
    fn stop(&self);
}

/// Content distribution store.
pub trait ContentDistribution: StartListener {
    /// Enables or disables the store depending on storage availability.
    fn update_configuration_from_storage_availability(&self);
}

/// Key/value configuration consumed by the daemon.
pub trait ConfigStore: Send + Sync {
    /// Stages a value.
    fn set(&self, key: &str, value: &str);

    /// Persists staged values.
    fn sync(&self) -> Result<(), ConfigSyncError>;
}

/// Errors raised while persisting daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigSyncError {
    /// Reading the existing configuration failed.
    #[error("failed to read configuration '{}': {source}", path.display())]
    Read {
        /// Configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the configuration failed.
    #[error("failed to write configuration '{}': {source}", path.display())]
    Write {
        /// Configuration file.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Callback handed to [`ServerControl::run`].
#[derive(Debug, Clone)]
pub struct ServerNotifier {
    poster: MessagePoster,
}

impl ServerNotifier {
    pub(crate) fn new(poster: MessagePoster) -> Self {
        Self { poster }
    }

    /// Reports that the daemon is listening.
    ///
    /// Readiness is handled on the lifecycle thread, after any startup work
    /// already in progress.
    pub fn server_started(&self) {
        self.poster.post(MessageTag::ServerUp, 0);
    }
}

/// Everything the orchestrator owns besides its own queues.
pub struct Subsystems {
    /// Daemon controller.
    pub server: Arc<dyn ServerControl>,
    /// Content distribution store.
    pub content: Arc<dyn ContentDistribution>,
    /// Daemon configuration store.
    pub config: Arc<dyn ConfigStore>,
    /// Peer registry.
    pub peers: Arc<dyn StartListener>,
    /// Identity registry.
    pub identities: Arc<dyn StartListener>,
}

impl fmt::Debug for Subsystems {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Subsystems").finish_non_exhaustive()
    }
}

/// Resources available while subsystems are constructed.
pub struct SubsystemContext<'a> {
    /// Daemon instance directory.
    pub instance_path: &'a Path,
    /// Background worker pool.
    pub pool: &'a WorkerPool,
    /// Publication point of the ready client.
    pub client: &'a Arc<ClientGate>,
}

/// Builds the subsystem set during orchestrator construction.
///
/// Construction must not perform fallible I/O; failures belong to the
/// startup sequence.
pub trait SubsystemFactory {
    /// Creates the subsystems.
    fn build(&self, context: &SubsystemContext<'_>) -> Subsystems;
}
