// src/repository/transport.rs

//! Single-attempt GET transport
//!
//! [`HttpTransport`] is the production implementation; tests swap in an
//! in-memory one.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;
use url::Url;

use super::config::RepositoryConfig;
use crate::error::{Error, Result};

/// A response whose body has not been read yet
pub struct Response {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response").field("status", &self.status).finish_non_exhaustive()
    }
}

/// Fetches one URL
///
/// Implementations return `Ok` for any response that arrived, whatever its
/// status, and `Error::Transport { status: None, .. }` when none did.
pub trait Transport {
    fn get(&self, url: &Url) -> Result<Response>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &Url) -> Result<Response> {
        (**self).get(url)
    }
}

/// Blocking reqwest transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &RepositoryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Transport {
                status: None,
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> Result<Response> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::Transport {
                status: e.status().map(|s| s.as_u16()),
                message: format!("GET {url}: {e}"),
            })?;

        let status = response.status().as_u16();
        debug!("GET {} -> {}", url, status);
        Ok(Response {
            status,
            body: Box::new(response),
        })
    }
}
