//! Escalation of unrecoverable lifecycle failures.

use std::process;

use crate::errors::FatalError;

const FATAL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::fatal");

/// Exit status used when the process terminates on a fatal error (`EX_SOFTWARE`).
pub const FATAL_EXIT_CODE: i32 = 70;

/// Decides what happens when lifecycle processing hits a [`FatalError`].
pub trait FatalPolicy: Send + Sync {
    /// Handles the error. Production policies do not return.
    fn escalate(&self, error: &FatalError);
}

/// Logs the error and terminates the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitProcess;

impl FatalPolicy for ExitProcess {
    fn escalate(&self, error: &FatalError) {
        tracing::error!(
            target: FATAL_TARGET,
            error = %error,
            exit_code = FATAL_EXIT_CODE,
            "unrecoverable lifecycle failure; terminating"
        );
        process::exit(FATAL_EXIT_CODE);
    }
}
