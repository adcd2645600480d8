//! Controller for the external `servald` process.
//!
//! The daemon is spawned in the foreground with its instance directory in
//! the environment, then probed on loopback until its HTTP port accepts
//! connections. Readiness is reported exactly once. The controller keeps the
//! child until it exits or [`ServerControl::stop`] kills and reaps it.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{error, info, warn};

use super::{ServerControl, ServerNotifier, StartListener};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

/// Environment variable naming the daemon's instance directory.
pub const INSTANCE_PATH_ENV: &str = "SERVALINSTANCE_PATH";

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
enum DaemonError {
    #[error("daemon instance path was never configured")]
    MissingInstancePath,
    #[error("failed to launch daemon '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to monitor daemon process: {source}")]
    Monitor {
        #[source]
        source: io::Error,
    },
    #[error("daemon exited before accepting connections ({status})")]
    ExitedEarly { status: ExitStatus },
    #[error("daemon was stopped by the orchestrator")]
    Stopped,
}

/// Runs `servald` as a child process.
#[derive(Debug)]
pub struct DaemonServer {
    command: String,
    port: u16,
    instance_path: Mutex<Option<PathBuf>>,
    endpoint: OnceCell<SocketAddr>,
    child: Mutex<Option<Child>>,
    stopped: AtomicBool,
}

impl DaemonServer {
    /// Creates a controller launching `command` and expecting it on `port`.
    #[must_use]
    pub fn new(command: impl Into<String>, port: u16) -> Self {
        Self {
            command: command.into(),
            port,
            instance_path: Mutex::new(None),
            endpoint: OnceCell::new(),
            child: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Loopback address the daemon is expected to listen on.
    #[must_use]
    pub fn expected_endpoint(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.port)
    }

    /// Process id of the running daemon, if one is supervised.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child_slot().as_ref().map(Child::id)
    }

    fn instance_path(&self) -> Option<PathBuf> {
        self.instance_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn child_slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the daemon into the child slot unless a stop already happened.
    fn spawn(&self, instance_path: &Path) -> Result<u32, DaemonError> {
        let mut slot = self.child_slot();
        if self.stopped.load(Ordering::SeqCst) {
            return Err(DaemonError::Stopped);
        }
        let child = Command::new(&self.command)
            .args(["start", "foreground"])
            .env(INSTANCE_PATH_ENV, instance_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DaemonError::Launch {
                command: self.command.clone(),
                source,
            })?;
        let pid = child.id();
        *slot = Some(child);
        Ok(pid)
    }

    /// Checks the supervised child, releasing the slot once it has exited.
    fn poll_child(&self) -> Result<Option<ExitStatus>, DaemonError> {
        let mut slot = self.child_slot();
        let child = slot.as_mut().ok_or(DaemonError::Stopped)?;
        let status = child
            .try_wait()
            .map_err(|source| DaemonError::Monitor { source })?;
        if status.is_some() {
            *slot = None;
        }
        Ok(status)
    }

    fn supervise(&self, notifier: &ServerNotifier) -> Result<ExitStatus, DaemonError> {
        let instance_path = self
            .instance_path()
            .ok_or(DaemonError::MissingInstancePath)?;
        let pid = self.spawn(&instance_path)?;
        info!(
            target: SERVER_TARGET,
            command = %self.command,
            pid,
            instance = %instance_path.display(),
            "daemon process spawned"
        );

        let endpoint = self.expected_endpoint();
        wait_until_listening(endpoint, || self.poll_child())?;
        if self.endpoint.set(endpoint).is_ok() {
            notifier.server_started();
        }

        loop {
            if let Some(status) = self.poll_child()? {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl StartListener for DaemonServer {
    fn on_start(&self) {
        info!(
            target: SERVER_TARGET,
            endpoint = ?self.endpoint.get(),
            "daemon API available"
        );
    }
}

impl ServerControl for DaemonServer {
    fn set_instance_path(&self, path: &Path) {
        let mut slot = self
            .instance_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(path.to_path_buf());
    }

    fn run(&self, notifier: ServerNotifier) {
        match self.supervise(&notifier) {
            Ok(status) if status.success() => {
                info!(target: SERVER_TARGET, "daemon process exited");
            }
            Ok(status) => {
                warn!(
                    target: SERVER_TARGET,
                    exit_code = status.code(),
                    "daemon process exited with failure"
                );
            }
            Err(DaemonError::Stopped) => {
                info!(target: SERVER_TARGET, "daemon supervision ended by stop");
            }
            Err(failure) => {
                error!(
                    target: SERVER_TARGET,
                    error = %failure,
                    "daemon process did not come up"
                );
            }
        }
    }

    fn listening_endpoint(&self) -> Option<SocketAddr> {
        self.endpoint.get().copied()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let Some(mut child) = self.child_slot().take() else {
            return;
        };
        let pid = child.id();
        if let Err(failure) = child.kill() {
            warn!(
                target: SERVER_TARGET,
                pid,
                error = %failure,
                "failed to signal daemon process"
            );
        }
        match child.wait() {
            Ok(status) => info!(
                target: SERVER_TARGET,
                pid,
                %status,
                "daemon process stopped"
            ),
            Err(failure) => warn!(
                target: SERVER_TARGET,
                pid,
                error = %failure,
                "failed to reap daemon process"
            ),
        }
    }
}

/// Polls `endpoint` until it accepts a connection, failing if the child
/// exits first. The child is checked before each probe so an exited daemon
/// is never mistaken for a listener left behind by another process.
fn wait_until_listening<F>(endpoint: SocketAddr, mut try_wait: F) -> Result<(), DaemonError>
where
    F: FnMut() -> Result<Option<ExitStatus>, DaemonError>,
{
    loop {
        if let Some(status) = try_wait()? {
            return Err(DaemonError::ExitedEarly { status });
        }
        if TcpStream::connect_timeout(&endpoint, PROBE_TIMEOUT).is_ok() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}
