//! Single-consumer queue for lifecycle messages.
//!
//! Messages are processed one at a time on a dedicated thread, in the order
//! their tags were first enqueued. Posting a tag that is already waiting
//! replaces the waiting argument in place rather than queueing a duplicate,
//! so a burst of identical requests collapses into one unit of work carrying
//! the latest argument. A tag that is currently being processed is not
//! affected; posting it again queues a fresh message.
//!
//! Handlers return [`FatalError`] for unrecoverable conditions. The error is
//! escalated to the configured [`FatalPolicy`] and the loop halts.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::FatalError;
use crate::fatal::FatalPolicy;

const SEQUENCER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sequencer");

/// Name of the thread that drains the lifecycle queue.
pub const SEQUENCER_THREAD: &str = "lifecycle";

/// Lifecycle operations understood by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Run the startup sequence.
    Start,
    /// Extend the keep-awake lease by the argument, in milliseconds.
    AcquireResource,
    /// The daemon reported that it is listening.
    ServerUp,
}

impl fmt::Display for MessageTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::AcquireResource => "acquire-resource",
            Self::ServerUp => "server-up",
        };
        formatter.write_str(label)
    }
}

/// Error returned when parsing a message tag fails.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported lifecycle message: {0}")]
pub struct MessageTagParseError(String);

impl FromStr for MessageTag {
    type Err = MessageTagParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "acquire-resource" => Ok(Self::AcquireResource),
            "server-up" => Ok(Self::ServerUp),
            other => Err(MessageTagParseError(other.to_owned())),
        }
    }
}

/// A tagged lifecycle message with its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleMessage {
    /// Operation to perform.
    pub tag: MessageTag,
    /// Operation-specific argument.
    pub arg: i64,
}

/// Consumer invoked for every dequeued message.
pub trait MessageHandler: Send + 'static {
    /// Processes one message to completion.
    fn handle(&self, message: LifecycleMessage) -> Result<(), FatalError>;
}

/// Observable state of the consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// The consumer thread has not been started.
    NotStarted,
    /// Waiting for the next message.
    Idle,
    /// Running the handler for the given tag.
    Processing(MessageTag),
    /// Stopped after a fatal error or shutdown.
    Halted,
}

struct Queue {
    order: VecDeque<MessageTag>,
    pending: HashMap<MessageTag, i64>,
    state: SequencerState,
    shutdown: bool,
}

impl Queue {
    /// A halted loop never drains, so it counts as settled with work queued.
    fn settled(&self) -> bool {
        match self.state {
            SequencerState::Halted => true,
            SequencerState::Processing(_) => false,
            SequencerState::NotStarted | SequencerState::Idle => self.order.is_empty(),
        }
    }
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    settled: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        // Handlers run outside the lock, so the queue is always consistent.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn post(&self, tag: MessageTag, arg: i64) {
        let mut queue = self.lock();
        if queue.shutdown {
            debug!(
                target: SEQUENCER_TARGET,
                message = %tag,
                "dropping message posted after shutdown"
            );
            return;
        }
        if queue.pending.insert(tag, arg).is_some() {
            debug!(
                target: SEQUENCER_TARGET,
                message = %tag,
                arg,
                "coalesced with pending message"
            );
        } else {
            queue.order.push_back(tag);
        }
        self.wake.notify_one();
    }

    fn halt(&self) {
        let mut queue = self.lock();
        queue.state = SequencerState::Halted;
        self.settled.notify_all();
    }
}

/// Cloneable handle that enqueues messages on a [`MessageSequencer`].
#[derive(Clone)]
pub struct MessagePoster {
    shared: Arc<Shared>,
}

impl MessagePoster {
    /// Enqueues `tag` with `arg`, coalescing with a waiting message of the same tag.
    pub fn post(&self, tag: MessageTag, arg: i64) {
        self.shared.post(tag, arg);
    }
}

impl fmt::Debug for MessagePoster {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("MessagePoster").finish_non_exhaustive()
    }
}

/// Serialises lifecycle messages onto one consumer thread.
pub struct MessageSequencer {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MessageSequencer {
    /// Creates a sequencer; messages queue until [`Self::start`] is called.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    order: VecDeque::new(),
                    pending: HashMap::new(),
                    state: SequencerState::NotStarted,
                    shutdown: false,
                }),
                wake: Condvar::new(),
                settled: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Spawns the consumer thread. Calling this twice is a no-op.
    pub fn start<H>(&self, handler: H, fatal_policy: Arc<dyn FatalPolicy>) -> io::Result<()>
    where
        H: MessageHandler,
    {
        let mut thread_slot = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if thread_slot.is_some() {
            warn!(target: SEQUENCER_TARGET, "sequencer already started");
            return Ok(());
        }
        {
            let mut queue = self.shared.lock();
            queue.state = SequencerState::Idle;
        }
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(SEQUENCER_THREAD.to_owned())
            .spawn(move || run_loop(&shared, &handler, fatal_policy.as_ref()));
        match spawned {
            Ok(handle) => {
                *thread_slot = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.shared.lock().state = SequencerState::NotStarted;
                Err(error)
            }
        }
    }

    /// Enqueues `tag` with `arg`, coalescing with a waiting message of the same tag.
    pub fn post(&self, tag: MessageTag, arg: i64) {
        self.shared.post(tag, arg);
    }

    /// Returns a handle other components can use to post messages.
    #[must_use]
    pub fn poster(&self) -> MessagePoster {
        MessagePoster {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current consumer state.
    #[must_use]
    pub fn state(&self) -> SequencerState {
        self.shared.lock().state
    }

    /// Messages waiting to be processed, in processing order.
    #[must_use]
    pub fn pending(&self) -> Vec<LifecycleMessage> {
        let queue = self.shared.lock();
        queue
            .order
            .iter()
            .filter_map(|tag| {
                queue
                    .pending
                    .get(tag)
                    .map(|arg| LifecycleMessage { tag: *tag, arg: *arg })
            })
            .collect()
    }

    /// Blocks until no message is waiting or running, or the loop has halted.
    ///
    /// Returns `false` on timeout.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let queue = self.shared.lock();
        let (queue, _timeout) = self
            .shared
            .settled
            .wait_timeout_while(queue, timeout, |queue| !queue.settled())
            .unwrap_or_else(PoisonError::into_inner);
        queue.settled()
    }
}

impl Default for MessageSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageSequencer {
    fn drop(&mut self) {
        // The last orchestrator reference can be released on the consumer
        // thread itself, so this only signals and never joins.
        let mut queue = self.shared.lock();
        queue.shutdown = true;
        self.shared.wake.notify_all();
    }
}

fn run_loop(shared: &Shared, handler: &dyn MessageHandler, fatal_policy: &dyn FatalPolicy) {
    while let Some(message) = next_message(shared) {
        debug!(
            target: SEQUENCER_TARGET,
            message = %message.tag,
            arg = message.arg,
            "processing lifecycle message"
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message)))
            .unwrap_or(Err(FatalError::HandlerPanicked { tag: message.tag }));
        if let Err(error) = outcome {
            shared.halt();
            fatal_policy.escalate(&error);
            return;
        }
    }
}

fn next_message(shared: &Shared) -> Option<LifecycleMessage> {
    let mut queue = shared.lock();
    loop {
        if queue.shutdown {
            queue.state = SequencerState::Halted;
            shared.settled.notify_all();
            return None;
        }
        if let Some(tag) = queue.order.pop_front() {
            let arg = queue.pending.remove(&tag).unwrap_or_default();
            queue.state = SequencerState::Processing(tag);
            return Some(LifecycleMessage { tag, arg });
        }
        queue.state = SequencerState::Idle;
        shared.settled.notify_all();
        queue = shared
            .wake
            .wait(queue)
            .unwrap_or_else(PoisonError::into_inner);
    }
}
