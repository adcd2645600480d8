use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::data_local_dir;

use crate::logging::LogFormat;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Executable launched as the external mesh daemon.
pub const DEFAULT_SERVER_COMMAND: &str = "servald";

/// Loopback port the daemon's RESTful API listens on.
pub const DEFAULT_SERVER_HTTP_PORT: u16 = 4110;

/// Zero disables the readiness deadline applied by the process entry point.
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 0;

/// Worker threads kept alive by the background pool even when idle.
pub const DEFAULT_POOL_MIN_WORKERS: usize = 1;

/// Upper bound on concurrently running background tasks.
pub const DEFAULT_POOL_MAX_WORKERS: usize = 4;

/// Seconds an idle worker above the minimum waits before retiring.
pub const DEFAULT_POOL_KEEP_ALIVE_SECS: u64 = 5;

const APPLICATION_DIR: &str = "serval-mid";
const FILES_DIR: &str = "files";

/// Default log filter expression used by the binary.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binary.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default private storage directory.
///
/// The orchestrator places its instance directory next to this one, so the
/// returned path always has a parent.
pub fn default_storage_dir() -> Utf8PathBuf {
    let mut base = application_base_directory();
    base.push(FILES_DIR);
    base
}

#[cfg(unix)]
fn application_base_directory() -> Utf8PathBuf {
    if let Some(dir) = data_local_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        return dir.join(APPLICATION_DIR);
    }
    let mut base = fallback_base_directory();
    base.push(APPLICATION_DIR);
    base.push(user_namespace());
    base
}

#[cfg(not(unix))]
fn application_base_directory() -> Utf8PathBuf {
    let mut base = fallback_base_directory();
    base.push(APPLICATION_DIR);
    base
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}
