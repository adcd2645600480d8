//! Fatal policy double that records escalations instead of exiting.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::errors::FatalError;
use crate::fatal::FatalPolicy;

/// Records rendered fatal errors.
#[derive(Debug, Default)]
pub struct RecordingFatalPolicy {
    escalations: Mutex<Vec<String>>,
    escalated: Condvar,
}

impl RecordingFatalPolicy {
    /// Rendered errors escalated so far.
    #[must_use]
    pub fn escalations(&self) -> Vec<String> {
        self.escalations
            .lock()
            .expect("fatal policy mutex poisoned")
            .clone()
    }

    /// Blocks until at least one escalation arrives.
    pub fn wait_for_escalation(&self, timeout: Duration) -> bool {
        let guard = self.escalations.lock().expect("fatal policy mutex poisoned");
        let (guard, _timeout) = self
            .escalated
            .wait_timeout_while(guard, timeout, |escalations| escalations.is_empty())
            .expect("fatal policy mutex poisoned");
        !guard.is_empty()
    }
}

impl FatalPolicy for RecordingFatalPolicy {
    fn escalate(&self, error: &FatalError) {
        self.escalations
            .lock()
            .expect("fatal policy mutex poisoned")
            .push(error.to_string());
        self.escalated.notify_all();
    }
}
