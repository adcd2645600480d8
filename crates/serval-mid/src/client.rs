//! Ready-gated handle to the daemon's RESTful API.
//!
//! [`RestfulClient`] captures where the daemon listens and how to
//! authenticate. [`ClientGate`] publishes exactly one client for the life of
//! the process: readers observe either nothing or the complete handle.

use std::net::SocketAddr;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use once_cell::sync::OnceCell;
use thiserror::Error;
use url::Url;

use crate::credential::Credential;

/// Structural problems detected while building a [`RestfulClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint does not name a concrete host.
    #[error("endpoint {endpoint} uses an unspecified address")]
    UnspecifiedAddress {
        /// Rejected endpoint.
        endpoint: SocketAddr,
    },
    /// The endpoint carries port zero.
    #[error("endpoint {endpoint} has no port")]
    ZeroPort {
        /// Rejected endpoint.
        endpoint: SocketAddr,
    },
    /// Basic authentication user names cannot be empty or contain `:`.
    #[error("invalid API user name '{username}'")]
    InvalidUsername {
        /// Rejected user name.
        username: String,
    },
    /// Composing a request URL failed.
    #[error("failed to build API url: {source}")]
    Url {
        /// Underlying parse error.
        #[from]
        source: url::ParseError,
    },
}

/// Connection parameters for the daemon's RESTful API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestfulClient {
    endpoint: SocketAddr,
    base_url: Url,
    username: String,
    credential: Credential,
}

impl RestfulClient {
    /// Builds a client for `endpoint` authenticating as `username`.
    pub fn new(
        endpoint: SocketAddr,
        username: &str,
        credential: &Credential,
    ) -> Result<Self, ClientError> {
        if endpoint.ip().is_unspecified() {
            return Err(ClientError::UnspecifiedAddress { endpoint });
        }
        if endpoint.port() == 0 {
            return Err(ClientError::ZeroPort { endpoint });
        }
        if username.is_empty() || username.contains(':') {
            return Err(ClientError::InvalidUsername {
                username: username.to_owned(),
            });
        }
        let base_url = Url::parse(&format!("http://{endpoint}/"))?;
        Ok(Self {
            endpoint,
            base_url,
            username: username.to_owned(),
            credential: credential.clone(),
        })
    }

    /// Address the daemon listens on.
    #[must_use]
    pub const fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Root URL of the API.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// API user name.
    #[must_use]
    pub fn username(&self) -> &str {
        self.username.as_str()
    }

    /// API password.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Resolves an API path against the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }
}

/// One-shot publication point for the ready client.
#[derive(Debug, Default)]
pub struct ClientGate {
    client: OnceCell<RestfulClient>,
    published: Mutex<bool>,
    signal: Condvar,
}

impl ClientGate {
    /// Creates an unpublished gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the client when it has been published.
    #[must_use]
    pub fn get(&self) -> Option<&RestfulClient> {
        self.client.get()
    }

    /// Publishes `client`; returns `false` when a client was already present.
    pub(crate) fn publish(&self, client: RestfulClient) -> bool {
        if self.client.set(client).is_err() {
            return false;
        }
        let mut published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *published = true;
        self.signal.notify_all();
        true
    }

    /// Blocks until the client is published or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<&RestfulClient> {
        if let Some(client) = self.client.get() {
            return Some(client);
        }
        let published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (published, _timeout) = self
            .signal
            .wait_timeout_while(published, timeout, |published| !*published)
            .unwrap_or_else(PoisonError::into_inner);
        drop(published);
        self.client.get()
    }
}
