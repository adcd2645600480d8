//! Lifecycle orchestration for an application embedding the Serval mesh
//! daemon.
//!
//! The crate starts `servald`, configures it with a freshly generated API
//! credential, and publishes a ready-gated [`RestfulClient`] once the daemon
//! listens. Three execution domains cooperate:
//!
//! - the caller's thread constructs the [`Orchestrator`] (normally through
//!   the process-wide [`registry`]) and returns immediately;
//! - a single lifecycle thread processes START, ACQUIRE-RESOURCE and
//!   SERVER-UP messages one at a time, coalescing duplicates that are still
//!   waiting;
//! - a bounded [`WorkerPool`] runs fire-and-forget background work.
//!
//! Startup is all-or-nothing. Failures that leave the application unusable
//! are [`FatalError`]s and go to a [`FatalPolicy`]; the production policy
//! logs and terminates the process. Health hooks emit structured telemetry
//! at each stage.

mod client;
mod credential;
mod errors;
mod fatal;
mod health;
mod lease;
mod orchestrator;
mod process;
pub mod registry;
mod sequencer;
pub mod subsystems;
mod telemetry;
mod worker_pool;

pub use client::{ClientError, ClientGate, RestfulClient};
pub use credential::{CREDENTIAL_BITS, CREDENTIAL_LEN, Credential, CredentialError};
pub use errors::{FatalError, OrchestratorError};
pub use fatal::{ExitProcess, FATAL_EXIT_CODE, FatalPolicy};
pub use health::{HealthReporter, StartupStep, StructuredHealthReporter};
pub use orchestrator::{
    AppContext, INSTANCE_DIR, INTERFACE_MATCH, Orchestrator, OrchestratorDeps, RESTFUL_USERNAME,
    SERVER_THREAD,
};
pub use process::{
    ConfigLoader, LaunchError, ShutdownCause, ShutdownError, ShutdownSignal, StaticConfigLoader,
    SystemConfigLoader, SystemShutdownSignal, run_process,
};
pub use registry::{ProcessRegistry, RegistryError};
pub use sequencer::{
    LifecycleMessage, MessageHandler, MessagePoster, MessageSequencer, MessageTag,
    MessageTagParseError, SEQUENCER_THREAD, SequencerState,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use worker_pool::WorkerPool;

#[cfg(test)]
mod tests;
