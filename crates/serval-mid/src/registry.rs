//! Process-wide access to the single orchestrator.
//!
//! [`ProcessRegistry`] is initialised at most once. The global [`REGISTRY`]
//! backs the free functions [`start`] and [`instance`]; tests and embedders
//! that need isolation construct their own registry or call
//! [`Orchestrator::new`] directly.

use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use serval_mid_config::PoolLimits;
use thiserror::Error;
use tracing::warn;

use crate::errors::FatalError;
use crate::orchestrator::{AppContext, Orchestrator, OrchestratorDeps};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Errors raised while starting the process-wide orchestrator.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An orchestrator already exists for this registry.
    #[error("the orchestrator has already been started")]
    AlreadyStarted,
    /// Building the orchestrator failed.
    #[error("failed to construct the orchestrator: {0}")]
    Construction(#[from] FatalError),
}

/// Holds at most one orchestrator for its lifetime.
#[derive(Debug)]
pub struct ProcessRegistry {
    instance: OnceCell<Arc<Orchestrator>>,
    starting: Mutex<()>,
}

impl ProcessRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            instance: OnceCell::new(),
            starting: Mutex::new(()),
        }
    }

    /// Constructs and records the orchestrator.
    ///
    /// A second call returns [`RegistryError::AlreadyStarted`] and leaves the
    /// existing instance untouched; a failed construction leaves the registry
    /// empty.
    pub fn start(
        &self,
        context: &AppContext,
        limits: PoolLimits,
        deps: OrchestratorDeps<'_>,
    ) -> Result<Arc<Orchestrator>, RegistryError> {
        // Serialises construction so a losing caller never spawns threads.
        let _starting = self
            .starting
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.instance.get().is_some() {
            warn!(target: REGISTRY_TARGET, "orchestrator start requested twice");
            return Err(RegistryError::AlreadyStarted);
        }
        let orchestrator = Orchestrator::new(context, limits, deps)?;
        self.instance
            .set(Arc::clone(&orchestrator))
            .map_err(|_| RegistryError::AlreadyStarted)?;
        Ok(orchestrator)
    }

    /// The orchestrator, once started.
    #[must_use]
    pub fn instance(&self) -> Option<Arc<Orchestrator>> {
        self.instance.get().cloned()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry shared by the whole process.
pub static REGISTRY: ProcessRegistry = ProcessRegistry::new();

/// Starts the process-wide orchestrator.
pub fn start(
    context: &AppContext,
    limits: PoolLimits,
    deps: OrchestratorDeps<'_>,
) -> Result<Arc<Orchestrator>, RegistryError> {
    REGISTRY.start(context, limits, deps)
}

/// The process-wide orchestrator, once started.
#[must_use]
pub fn instance() -> Option<Arc<Orchestrator>> {
    REGISTRY.instance()
}
