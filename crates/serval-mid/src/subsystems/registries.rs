//! Identity and peer registries bound to the daemon API.
//!
//! On start each registry resolves the RESTful resource it reads from against
//! the published client. Resolution runs on the worker pool so the start
//! notification returns immediately. Fetching and parsing the resources is
//! left to the registry consumers.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use url::Url;

use super::StartListener;
use crate::client::{ClientError, ClientGate};
use crate::worker_pool::WorkerPool;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registries");

const IDENTITIES_PATH: &str = "restful/keyring/identities.json";
const PEERS_PATH: &str = "restful/route/all.json";

/// Source resolution shared by API-backed registries.
#[derive(Debug)]
struct ApiRegistry {
    name: &'static str,
    path: &'static str,
    pool: WorkerPool,
    client: Arc<ClientGate>,
    last_source: Arc<Mutex<Option<Url>>>,
}

impl ApiRegistry {
    fn new(
        name: &'static str,
        path: &'static str,
        pool: &WorkerPool,
        client: &Arc<ClientGate>,
    ) -> Self {
        Self {
            name,
            path,
            pool: pool.clone(),
            client: Arc::clone(client),
            last_source: Arc::new(Mutex::new(None)),
        }
    }

    fn resolve_source(&self) {
        let name = self.name;
        let path = self.path;
        let client = Arc::clone(&self.client);
        let last_source = Arc::clone(&self.last_source);
        self.pool.submit(move || -> Result<(), ClientError> {
            let Some(client) = client.get() else {
                debug!(
                    target: REGISTRY_TARGET,
                    registry = name,
                    "source unresolved; API client not published"
                );
                return Ok(());
            };
            let source = client.url_for(path)?;
            debug!(
                target: REGISTRY_TARGET,
                registry = name,
                source = %source,
                "registry source resolved"
            );
            *last_source.lock().unwrap_or_else(PoisonError::into_inner) = Some(source);
            Ok(())
        });
    }

    fn last_source(&self) -> Option<Url> {
        self.last_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Local identities held in the daemon keyring.
#[derive(Debug)]
pub struct Identities {
    inner: ApiRegistry,
}

impl Identities {
    /// Creates the registry; nothing is resolved until [`StartListener::on_start`].
    #[must_use]
    pub fn new(pool: &WorkerPool, client: &Arc<ClientGate>) -> Self {
        Self {
            inner: ApiRegistry::new("identities", IDENTITIES_PATH, pool, client),
        }
    }

    /// API resource resolved on the last start notification.
    #[must_use]
    pub fn last_source(&self) -> Option<Url> {
        self.inner.last_source()
    }
}

impl StartListener for Identities {
    fn on_start(&self) {
        self.inner.resolve_source();
    }
}

/// Peers currently reachable through the mesh.
#[derive(Debug)]
pub struct KnownPeers {
    inner: ApiRegistry,
}

impl KnownPeers {
    /// Creates the registry; nothing is resolved until [`StartListener::on_start`].
    #[must_use]
    pub fn new(pool: &WorkerPool, client: &Arc<ClientGate>) -> Self {
        Self {
            inner: ApiRegistry::new("peers", PEERS_PATH, pool, client),
        }
    }

    /// API resource resolved on the last start notification.
    #[must_use]
    pub fn last_source(&self) -> Option<Url> {
        self.inner.last_source()
    }
}

impl StartListener for KnownPeers {
    fn on_start(&self) {
        self.inner.resolve_source();
    }
}
