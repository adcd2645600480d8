//! File-backed daemon configuration.
//!
//! The daemon reads `key=value` lines from `serval.conf` in its instance
//! directory. Values are staged in memory by [`ConfigStore::set`] and merged
//! over the existing file on [`ConfigStore::sync`]. Only lines whose key was
//! staged are rewritten; every other line, comments and blanks included, is
//! kept verbatim and in place. New keys are appended.

use std::collections::BTreeMap;
use std::fs::{self, DirBuilder};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::Builder;
use tracing::debug;

use super::{ConfigStore, ConfigSyncError};

const CONFIG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::config_store");

/// File name of the daemon configuration inside the instance directory.
pub const CONFIG_FILE_NAME: &str = "serval.conf";

/// One line of `serval.conf`, kept as written unless its key is restaged.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigLine {
    key: Option<String>,
    text: String,
}

impl ConfigLine {
    fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let key = if trimmed.starts_with('#') {
            None
        } else {
            trimmed
                .split_once('=')
                .map(|(key, _)| key.trim().to_owned())
                .filter(|key| !key.is_empty())
        };
        Self {
            key,
            text: text.to_owned(),
        }
    }

    fn entry(key: &str, value: &str) -> Self {
        Self {
            key: Some(key.to_owned()),
            text: format!("{key}={value}"),
        }
    }
}

/// Daemon configuration persisted in the instance directory.
#[derive(Debug)]
pub struct ServalConfigFile {
    path: PathBuf,
    staged: Mutex<BTreeMap<String, String>>,
}

impl ServalConfigFile {
    /// Creates a store for the configuration of the given instance.
    #[must_use]
    pub fn for_instance(instance_path: &Path) -> Self {
        Self {
            path: instance_path.join(CONFIG_FILE_NAME),
            staged: Mutex::new(BTreeMap::new()),
        }
    }

    /// Location of the configuration file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn read_existing(&self) -> Result<Vec<ConfigLine>, ConfigSyncError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ConfigSyncError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        Ok(contents.lines().map(ConfigLine::parse).collect())
    }

    fn write_error(&self, source: io::Error) -> ConfigSyncError {
        ConfigSyncError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for ServalConfigFile {
    fn set(&self, key: &str, value: &str) {
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        staged.insert(key.to_owned(), value.to_owned());
    }

    fn sync(&self) -> Result<(), ConfigSyncError> {
        let mut staged = self.staged.lock().unwrap_or_else(PoisonError::into_inner);
        let mut lines = self.read_existing()?;
        for (key, value) in staged.iter() {
            let replacement = ConfigLine::entry(key, value);
            match lines
                .iter_mut()
                .find(|line| line.key.as_deref() == Some(key.as_str()))
            {
                Some(line) => *line = replacement,
                None => lines.push(replacement),
            }
        }
        let rendered: String = lines
            .iter()
            .map(|line| format!("{}\n", line.text))
            .collect();

        if let Some(parent) = self.path.parent() {
            let mut builder = DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder
                .create(parent)
                .map_err(|source| self.write_error(source))?;
        }
        atomic_write(&self.path, rendered.as_bytes()).map_err(|source| self.write_error(source))?;
        debug!(
            target: CONFIG_TARGET,
            file = %self.path.display(),
            keys = staged.len(),
            "daemon configuration synced"
        );
        staged.clear();
        Ok(())
    }
}

/// Writes the bytes to `path` through a temporary sibling that is fsync'd
/// and renamed into place, so readers never see a partial file.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(CONFIG_FILE_NAME),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn instance() -> TempDir {
        TempDir::new().expect("temp dir")
    }

    #[rstest]
    fn sync_creates_instance_directory_and_file(instance: TempDir) {
        let store = ServalConfigFile::for_instance(&instance.path().join("instance"));
        store.set("interfaces.0.match", "eth0,wlan0");
        store.set("mdp.enable_inet", "on");

        store.sync().expect("sync succeeds");

        let written = fs::read_to_string(store.path()).expect("config written");
        assert_eq!(written, "interfaces.0.match=eth0,wlan0\nmdp.enable_inet=on\n");
    }

    #[rstest]
    fn sync_preserves_unrelated_lines_and_order(instance: TempDir) {
        let store = ServalConfigFile::for_instance(instance.path());
        fs::write(
            store.path(),
            "# managed by servald\nlog.level = debug\n\nmdp.enable_inet=off\nstray line\n",
        )
        .expect("seed config");

        store.set("mdp.enable_inet", "on");
        store.set("interfaces.0.default_route", "on");
        store.sync().expect("sync succeeds");

        let written = fs::read_to_string(store.path()).expect("config written");
        assert_eq!(
            written,
            concat!(
                "# managed by servald\n",
                "log.level = debug\n",
                "\n",
                "mdp.enable_inet=on\n",
                "stray line\n",
                "interfaces.0.default_route=on\n",
            )
        );
    }

    #[rstest]
    #[case("# mdp.enable_inet=on", None)]
    #[case("  log.level = debug", Some("log.level"))]
    #[case("=orphan", None)]
    #[case("", None)]
    fn lines_are_keyed_only_when_they_hold_a_pair(
        #[case] text: &str,
        #[case] key: Option<&str>,
    ) {
        let line = ConfigLine::parse(text);
        assert_eq!(line.key.as_deref(), key);
        assert_eq!(line.text, text);
    }

    #[rstest]
    fn sync_fails_when_instance_path_is_a_file(instance: TempDir) {
        let blocker = instance.path().join("instance");
        fs::write(&blocker, "not a directory").expect("seed blocker");
        let store = ServalConfigFile::for_instance(&blocker);
        store.set("mdp.enable_inet", "on");

        let error = store.sync().expect_err("sync must fail");
        assert!(matches!(error, ConfigSyncError::Read { .. }));
    }
}
