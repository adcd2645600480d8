//! BDD test world: daemon behaviour, store failures and the orchestrator under test.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::orchestrator::Orchestrator;

use super::doubles::Announce;
use super::harness::{Harness, WAIT};

/// Scenario world shared across lifecycle steps.
pub struct LifecycleWorld {
    mode: Announce,
    fail_sync: bool,
    harness: Option<Harness>,
    orchestrator: Option<Arc<Orchestrator>>,
}

impl LifecycleWorld {
    /// Builds a world with a silent daemon and a working store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mode: Announce::Never,
            fail_sync: false,
            harness: None,
            orchestrator: None,
        }
    }

    /// The daemon reports readiness on `endpoint` as soon as it runs.
    pub fn use_announcing_daemon(&mut self, endpoint: SocketAddr) {
        self.mode = Announce::At(endpoint);
    }

    /// The daemon never reports readiness on its own.
    pub fn use_silent_daemon(&mut self) {
        self.mode = Announce::Never;
    }

    /// The configuration store fails every sync.
    pub fn fail_config_sync(&mut self) {
        self.fail_sync = true;
    }

    /// Constructs the orchestrator and waits for START to be processed.
    pub fn start(&mut self) {
        let harness = Harness::new(self.mode);
        if self.fail_sync {
            harness.store.fail_sync();
        }
        let orchestrator = harness.start();
        orchestrator.wait_settled(WAIT);
        self.harness = Some(harness);
        self.orchestrator = Some(orchestrator);
    }

    /// Harness of the started orchestrator.
    pub fn harness(&self) -> Result<&Harness, String> {
        self.harness
            .as_ref()
            .ok_or_else(|| String::from("orchestrator not started"))
    }

    /// The orchestrator under test.
    pub fn orchestrator(&self) -> Result<&Arc<Orchestrator>, String> {
        self.orchestrator
            .as_ref()
            .ok_or_else(|| String::from("orchestrator not started"))
    }
}

impl Default for LifecycleWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture constructor for the lifecycle world.
#[must_use]
pub fn world() -> RefCell<LifecycleWorld> {
    RefCell::new(LifecycleWorld::new())
}
