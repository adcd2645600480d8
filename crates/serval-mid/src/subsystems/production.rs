//! Production wiring of the subsystem set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serval_mid_config::{Config, StoragePaths};

use super::{
    DaemonServer, Identities, KnownPeers, Rhizome, ServalConfigFile, SubsystemContext,
    SubsystemFactory, Subsystems,
};

/// Builds the real daemon controller, stores and registries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServalSubsystems {
    server_command: String,
    server_http_port: u16,
    content_dir: Option<PathBuf>,
}

impl ServalSubsystems {
    /// Creates a factory from resolved configuration.
    #[must_use]
    pub fn from_config(config: &Config, paths: &StoragePaths) -> Self {
        Self {
            server_command: config.server_command().to_owned(),
            server_http_port: config.server_http_port(),
            content_dir: paths.content_dir().map(Path::to_path_buf),
        }
    }
}

impl SubsystemFactory for ServalSubsystems {
    fn build(&self, context: &SubsystemContext<'_>) -> Subsystems {
        Subsystems {
            server: Arc::new(DaemonServer::new(
                self.server_command.clone(),
                self.server_http_port,
            )),
            content: Arc::new(Rhizome::new(self.content_dir.clone())),
            config: Arc::new(ServalConfigFile::for_instance(context.instance_path)),
            peers: Arc::new(KnownPeers::new(context.pool, context.client)),
            identities: Arc::new(Identities::new(context.pool, context.client)),
        }
    }
}
