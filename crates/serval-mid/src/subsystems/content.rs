//! Content distribution store backed by shared storage.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::{ContentDistribution, StartListener};

const CONTENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::content");

/// Directory created under the content root for the store's own files.
pub const STORE_DIR_NAME: &str = "rhizome";

/// Content store that is only enabled when its storage is usable.
#[derive(Debug)]
pub struct Rhizome {
    root: Option<PathBuf>,
    enabled: AtomicBool,
}

impl Rhizome {
    /// Creates a store rooted at `root`; `None` keeps it permanently disabled.
    #[must_use]
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            enabled: AtomicBool::new(false),
        }
    }

    /// Returns `true` after a successful availability probe.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Directory holding the store's files, if configured.
    #[must_use]
    pub fn store_dir(&self) -> Option<PathBuf> {
        self.root.as_deref().map(|root| root.join(STORE_DIR_NAME))
    }
}

impl StartListener for Rhizome {
    fn on_start(&self) {
        if !self.is_enabled() {
            return;
        }
        let Some(store) = self.store_dir() else {
            return;
        };
        match fs::create_dir_all(&store) {
            Ok(()) => info!(
                target: CONTENT_TARGET,
                store = %store.display(),
                "content store ready"
            ),
            Err(error) => {
                self.enabled.store(false, Ordering::Release);
                warn!(
                    target: CONTENT_TARGET,
                    store = %store.display(),
                    error = %error,
                    "content store unavailable; disabling"
                );
            }
        }
    }
}

impl ContentDistribution for Rhizome {
    fn update_configuration_from_storage_availability(&self) {
        let available = match self.root.as_deref() {
            Some(root) => match probe_writable(root) {
                Ok(()) => true,
                Err(error) => {
                    warn!(
                        target: CONTENT_TARGET,
                        root = %root.display(),
                        error = %error,
                        "content storage not writable"
                    );
                    false
                }
            },
            None => false,
        };
        self.enabled.store(available, Ordering::Release);
        info!(
            target: CONTENT_TARGET,
            enabled = available,
            "content distribution availability updated"
        );
    }
}

fn probe_writable(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root)?;
    let metadata = fs::metadata(root)?;
    if metadata.permissions().readonly() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "content storage is read-only",
        ));
    }
    tempfile::tempfile_in(root).map(drop)
}
