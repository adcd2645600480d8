//! Process entry point: configuration, telemetry, registry start and the
//! shutdown wait.

mod errors;
mod launch;
mod loader;
mod shutdown;

pub use errors::LaunchError;
pub use launch::run_process;
#[cfg(test)]
pub(crate) use launch::{LaunchPlan, run_process_with};
pub use loader::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use shutdown::{ShutdownCause, ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
