//! Termination signals and daemon teardown.

use std::fmt;
use std::io;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;

use super::PROCESS_TARGET;

/// Signals that end the process.
const TERMINATION_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Blocks the entry point until the process should wind down.
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown should proceed, reporting why.
    fn wait(&self) -> Result<ShutdownCause, ShutdownError>;
}

/// Why the orchestrator is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// A termination signal arrived.
    Signal(i32),
    /// The listener returned without a signal.
    Requested,
    /// The entry point failed after the orchestrator started.
    Failed,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(formatter, "signal {signal}"),
            Self::Requested => formatter.write_str("requested"),
            Self::Failed => formatter.write_str("launch failure"),
        }
    }
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the signal iterator failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Waits for SIGTERM, SIGINT, SIGQUIT or SIGHUP.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl SystemShutdownSignal {
    /// Builds a signal listener.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<ShutdownCause, ShutdownError> {
        let mut signals =
            Signals::new(TERMINATION_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        Ok(signals
            .forever()
            .next()
            .map_or(ShutdownCause::Requested, ShutdownCause::Signal))
    }
}

/// Stops the supervised daemon so it does not outlive the process.
pub(crate) fn tear_down(orchestrator: &Orchestrator, cause: ShutdownCause) {
    let instance = orchestrator.instance_path().display();
    match cause {
        ShutdownCause::Failed => warn!(
            target: PROCESS_TARGET,
            %cause,
            %instance,
            "stopping daemon after launch failure"
        ),
        ShutdownCause::Signal(_) | ShutdownCause::Requested => info!(
            target: PROCESS_TARGET,
            %cause,
            %instance,
            "stopping daemon"
        ),
    }
    orchestrator.shutdown();
}
