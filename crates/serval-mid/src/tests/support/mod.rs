//! Test harness utilities shared by the unit and behavioural suites.

mod doubles;
mod events;
mod fatal;
mod harness;
mod reporter;
mod world;

pub use doubles::{Announce, RecordingConfigStore, RecordingFactory};
pub use events::{EventLog, LifecycleEvent};
pub use fatal::RecordingFatalPolicy;
pub use harness::{Harness, WAIT, loopback};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use world::{LifecycleWorld, world};
