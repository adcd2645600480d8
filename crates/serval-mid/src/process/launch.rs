//! Sequences process startup around the orchestrator.

use std::sync::Arc;

use serval_mid_config::{Config, StoragePaths};
use tracing::info;

use crate::fatal::{ExitProcess, FatalPolicy};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::orchestrator::{AppContext, Orchestrator, OrchestratorDeps};
use crate::registry::{ProcessRegistry, REGISTRY};
use crate::subsystems::{ServalSubsystems, SubsystemFactory};
use crate::telemetry;

use super::errors::LaunchError;
use super::loader::{ConfigLoader, SystemConfigLoader};
use super::shutdown::{ShutdownCause, ShutdownSignal, SystemShutdownSignal, tear_down};
use super::PROCESS_TARGET;

/// Builds the subsystem factory once configuration is resolved.
pub(crate) type FactoryBuilder = Box<dyn FnOnce(&Config, &StoragePaths) -> Box<dyn SubsystemFactory>>;

/// Collaborators required to run the orchestrator process.
pub(crate) struct LaunchPlan<'a, L, S> {
    pub(crate) loader: L,
    pub(crate) shutdown: S,
    pub(crate) registry: &'a ProcessRegistry,
    pub(crate) subsystems: FactoryBuilder,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) fatal_policy: Arc<dyn FatalPolicy>,
}

/// Runs the orchestrator with production collaborators until a
/// termination signal arrives.
pub fn run_process() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        shutdown: SystemShutdownSignal::new(),
        registry: &REGISTRY,
        subsystems: Box::new(|config: &Config, paths: &StoragePaths| {
            Box::new(ServalSubsystems::from_config(config, paths)) as Box<dyn SubsystemFactory>
        }),
        reporter: Arc::new(StructuredHealthReporter::new()),
        fatal_policy: Arc::new(ExitProcess),
    };
    run_process_with(plan)
}

/// Runs the orchestrator with injected collaborators.
pub(crate) fn run_process_with<L, S>(plan: LaunchPlan<'_, L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        shutdown,
        registry,
        subsystems,
        reporter,
        fatal_policy,
    } = plan;

    let config = loader.load()?;
    telemetry::initialise(&config)?;
    info!(
        target: PROCESS_TARGET,
        storage = %config.storage_dir(),
        server_command = %config.server_command(),
        server_port = config.server_http_port(),
        "starting orchestrator process"
    );

    let paths = StoragePaths::from_config(&config)?;
    let limits = config.pool_limits()?;
    let context = AppContext::from_storage(&paths);
    let factory = subsystems(&config, &paths);
    let orchestrator = registry.start(
        &context,
        limits,
        OrchestratorDeps {
            factory: factory.as_ref(),
            reporter,
            fatal_policy,
        },
    )?;

    let outcome = serve(&config, &orchestrator, &shutdown);
    tear_down(
        &orchestrator,
        outcome
            .as_ref()
            .map_or(ShutdownCause::Failed, |cause| *cause),
    );
    outcome?;
    info!(
        target: PROCESS_TARGET,
        "shutdown sequence completed"
    );
    Ok(())
}

/// Waits for readiness when a timeout is configured, then for shutdown.
fn serve<S>(
    config: &Config,
    orchestrator: &Orchestrator,
    shutdown: &S,
) -> Result<ShutdownCause, LaunchError>
where
    S: ShutdownSignal,
{
    if let Some(timeout) = config.startup_timeout() {
        let client = orchestrator.wait_for_client(timeout)?;
        info!(
            target: PROCESS_TARGET,
            endpoint = %client.endpoint(),
            "daemon ready"
        );
    }
    Ok(shutdown.wait()?)
}
