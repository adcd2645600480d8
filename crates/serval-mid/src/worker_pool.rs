//! Bounded pool of background worker threads.
//!
//! Work submitted here has no ordering relationship with the lifecycle
//! sequence or with other tasks. Workers are spawned on demand up to the
//! configured ceiling; those above the floor retire after sitting idle for
//! the keep-alive period. The backlog is unbounded, so submissions never
//! block or get rejected.
//!
//! A task that fails, whether by returning an error or by panicking, is
//! logged and dropped. It is not retried and the worker carries on.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use serval_mid_config::PoolLimits;
use tracing::{debug, error, warn};

const POOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::worker_pool");

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct PoolState {
    backlog: VecDeque<Task>,
    workers: usize,
    idle: usize,
    closed: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
    limits: PoolLimits,
    spawned: AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Tasks run outside the lock, so a poisoned guard still holds
        // consistent bookkeeping.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the background worker pool.
///
/// Cloning is cheap; all clones share the same workers. When the last
/// handle is dropped the workers drain the backlog and exit.
#[derive(Clone)]
pub struct WorkerPool {
    handle: Arc<PoolHandle>,
}

struct PoolHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.handle.shared.lock();
        formatter
            .debug_struct("WorkerPool")
            .field("limits", &self.handle.shared.limits)
            .field("workers", &state.workers)
            .field("queued", &state.backlog.len())
            .finish()
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.closed = true;
        self.shared.available.notify_all();
    }
}

impl WorkerPool {
    /// Creates a pool; no threads are spawned until work arrives.
    #[must_use]
    pub fn new(limits: PoolLimits) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
            limits,
            spawned: AtomicUsize::new(0),
        });
        Self {
            handle: Arc::new(PoolHandle { shared }),
        }
    }

    /// Runs `task` on a worker thread.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(Box::new(task));
    }

    /// Runs a fallible `task` on a worker thread, logging its error.
    pub fn submit<F, E>(&self, task: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Display,
    {
        self.execute(move || {
            if let Err(error) = task() {
                warn!(
                    target: POOL_TARGET,
                    error = %error,
                    "background task failed"
                );
            }
        });
    }

    /// Limits the pool was created with.
    #[must_use]
    pub fn limits(&self) -> PoolLimits {
        self.handle.shared.limits
    }

    /// Number of live worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handle.shared.lock().workers
    }

    /// Number of tasks waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.handle.shared.lock().backlog.len()
    }

    fn dispatch(&self, task: Task) {
        let shared = &self.handle.shared;
        let mut state = shared.lock();
        state.backlog.push_back(task);
        if state.backlog.len() > state.idle && state.workers < shared.limits.max_workers() {
            state.workers += 1;
            drop(state);
            spawn_worker(shared);
        } else {
            shared.available.notify_one();
        }
    }
}

fn spawn_worker(shared: &Arc<Shared>) {
    let id = shared.spawned.fetch_add(1, Ordering::Relaxed);
    let worker_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("mid-worker-{id}"))
        .spawn(move || worker_loop(&worker_shared));
    if let Err(source) = spawned {
        let mut state = shared.lock();
        state.workers -= 1;
        error!(
            target: POOL_TARGET,
            error = %source,
            workers = state.workers,
            queued = state.backlog.len(),
            "failed to spawn worker thread"
        );
        // An existing worker may still pick the task up.
        shared.available.notify_one();
    }
}

fn worker_loop(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if let Some(task) = state.backlog.pop_front() {
            drop(state);
            run_isolated(task);
            state = shared.lock();
            continue;
        }
        if state.closed {
            state.workers -= 1;
            return;
        }
        state.idle += 1;
        let (guard, wait) = shared
            .available
            .wait_timeout(state, shared.limits.keep_alive())
            .unwrap_or_else(PoisonError::into_inner);
        state = guard;
        state.idle -= 1;
        if wait.timed_out()
            && state.backlog.is_empty()
            && state.workers > shared.limits.min_workers()
        {
            state.workers -= 1;
            debug!(
                target: POOL_TARGET,
                workers = state.workers,
                "idle worker retired"
            );
            return;
        }
    }
}

fn run_isolated(task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        warn!(
            target: POOL_TARGET,
            panic = panic_message(payload.as_ref()),
            "background task panicked"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
