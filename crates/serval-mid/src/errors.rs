//! Error taxonomy of the lifecycle core.
//!
//! [`FatalError`] covers conditions that leave the application unusable:
//! startup is all-or-nothing, so these are escalated to a
//! [`FatalPolicy`](crate::FatalPolicy) instead of being retried.
//! [`OrchestratorError`] covers callers using the orchestrator before it is
//! ready.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;
use crate::credential::CredentialError;
use crate::sequencer::MessageTag;
use crate::subsystems::ConfigSyncError;

/// Unrecoverable lifecycle failures.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The private storage directory has no parent to host the instance directory.
    #[error("cannot derive instance path from storage directory '{}'", storage_dir.display())]
    InstancePath {
        /// Storage directory supplied by the application context.
        storage_dir: PathBuf,
    },
    /// Generating the API credential failed.
    #[error("failed to generate API credential: {source}")]
    Credential {
        /// Underlying credential error.
        #[source]
        source: CredentialError,
    },
    /// Flushing the daemon configuration failed.
    #[error("failed to sync daemon configuration: {source}")]
    ConfigSync {
        /// Underlying store error.
        #[source]
        source: ConfigSyncError,
    },
    /// A lifecycle thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    SpawnThread {
        /// Name of the thread.
        name: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The daemon reported readiness without a listening endpoint.
    #[error("daemon reported readiness without a listening endpoint")]
    MissingEndpoint,
    /// The daemon reported readiness before a credential was generated.
    #[error("daemon reported readiness before the API credential was generated")]
    MissingCredential,
    /// The ready client could not be built from the reported parameters.
    #[error("failed to build API client: {source}")]
    ClientConstruction {
        /// Underlying client error.
        #[source]
        source: ClientError,
    },
    /// A lifecycle handler panicked.
    #[error("lifecycle handler for '{tag}' panicked")]
    HandlerPanicked {
        /// Message being processed.
        tag: MessageTag,
    },
}

/// Misuse of the orchestrator's public surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The client was requested before the daemon reported readiness.
    #[error("API client requested before the daemon reported readiness")]
    ClientNotReady,
    /// The daemon did not report readiness within the allotted time.
    #[error("daemon did not report readiness within {waited:?}")]
    ReadyTimeout {
        /// Time spent waiting.
        waited: Duration,
    },
}
