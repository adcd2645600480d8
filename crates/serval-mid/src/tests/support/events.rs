//! Shared, ordered record of calls made into the subsystem doubles.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::subsystems::SubsystemKind;

/// Observable call into a subsystem double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The daemon controller received its instance directory.
    InstancePathSet(PathBuf),
    /// The content store re-evaluated storage.
    StorageChecked,
    /// A configuration value was staged.
    ConfigSet { key: String, value: String },
    /// Staged configuration was flushed.
    ConfigSynced,
    /// The daemon controller's `run` was entered.
    ServerRun,
    /// The daemon controller was asked to stop.
    ServerStopped,
    /// A subsystem received its start notification.
    Started(SubsystemKind),
}

/// Cloneable log recording events across threads.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    inner: Arc<(Mutex<Vec<LifecycleEvent>>, Condvar)>,
}

impl EventLog {
    /// Appends an event and wakes waiters.
    pub fn record(&self, event: LifecycleEvent) {
        let (events, changed) = &*self.inner;
        events.lock().expect("event log mutex poisoned").push(event);
        changed.notify_all();
    }

    /// Copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.inner.0.lock().expect("event log mutex poisoned").clone()
    }

    /// Number of recorded events equal to `event`.
    #[must_use]
    pub fn count(&self, event: &LifecycleEvent) -> usize {
        self.events().iter().filter(|seen| *seen == event).count()
    }

    /// Start notifications in the order they were delivered.
    #[must_use]
    pub fn start_order(&self) -> Vec<SubsystemKind> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LifecycleEvent::Started(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    /// Blocks until `predicate` holds for the log or `timeout` elapses.
    pub fn wait_for(
        &self,
        timeout: Duration,
        mut predicate: impl FnMut(&[LifecycleEvent]) -> bool,
    ) -> bool {
        let (events, changed) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = events.lock().expect("event log mutex poisoned");
        loop {
            if predicate(guard.as_slice()) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = changed
                .wait_timeout(guard, deadline - now)
                .expect("event log mutex poisoned")
                .0;
        }
    }

    /// Blocks until `event` has been recorded.
    pub fn wait_for_event(&self, event: &LifecycleEvent, timeout: Duration) -> bool {
        self.wait_for(timeout, |events| events.contains(event))
    }
}
