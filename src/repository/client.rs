// src/repository/client.rs

//! Memoizing metadata client for one repository
//!
//! Every fetch resolves its URL from the configuration (and, for catalogs,
//! from repomd.xml), performs a single GET and decodes the body under the
//! configured size ceiling (repomd.xml and its signature have fixed caps of
//! their own). Successful results are kept until the next
//! [`RepositoryClient::clear`] or [`RepositoryClient::configure`]; failures
//! are not cached.

use std::io::Read;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use super::config::{join_href, repomd_url, signature_url, RepositoryConfig};
use super::gpg::{fetch_gpg_key, GpgKey};
use super::parsers::repomd::{GROUP, MAX_REPOMD_SIZE, MODULES, PRIMARY};
use super::parsers::{
    decode_comps, decode_module_streams, decode_primary, Comps, EnvironmentRecord, GroupRecord,
    ModuleStreamRecord, PackageRecord, RepomdIndex,
};
use super::transport::{HttpTransport, Transport};
use crate::error::{Error, Result};

/// Largest detached repomd.xml signature read (1 MiB)
const MAX_SIGNATURE_SIZE: u64 = 1024 * 1024;

/// A decoded artifact and the HTTP status it was served with
///
/// `status` is `None` when nothing was fetched, e.g. for an optional
/// artifact that repomd.xml does not list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub value: T,
    pub status: Option<u16>,
}

impl<T> Fetched<T> {
    pub fn as_ref(&self) -> Fetched<&T> {
        Fetched {
            value: &self.value,
            status: self.status,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            status: self.status,
        }
    }
}

/// A failed fetch
///
/// `status` is the HTTP status of the response that failed to decode or was
/// not successful, or `None` when no response was received.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct FetchError {
    pub status: Option<u16>,
    pub source: Error,
}

impl From<Error> for FetchError {
    fn from(source: Error) -> Self {
        Self {
            status: source.status(),
            source,
        }
    }
}

pub type FetchResult<T> = std::result::Result<Fetched<T>, FetchError>;

/// One slot per artifact kind
#[derive(Debug, Default)]
struct MetadataCache {
    repomd: Option<Fetched<RepomdIndex>>,
    packages: Option<Fetched<Vec<PackageRecord>>>,
    groups: Option<Fetched<Vec<GroupRecord>>>,
    environments: Option<Fetched<Vec<EnvironmentRecord>>>,
    module_streams: Option<Fetched<Vec<ModuleStreamRecord>>>,
    signature: Option<Fetched<String>>,
}

impl MetadataCache {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Client for the metadata of one Yum/DNF repository
///
/// Memoizing calls take `&mut self`; share an instance across threads only
/// behind a lock.
pub struct RepositoryClient<T: Transport = HttpTransport> {
    config: RepositoryConfig,
    transport: T,
    cache: MetadataCache,
}

impl RepositoryClient<HttpTransport> {
    /// Client backed by a reqwest blocking transport built from `config`
    ///
    /// The transport keeps the timeout and user agent it was built with
    /// across [`RepositoryClient::configure`].
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> RepositoryClient<T> {
    pub fn with_transport(config: RepositoryConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            cache: MetadataCache::default(),
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Switch to a new configuration, dropping everything fetched so far
    pub fn configure(&mut self, config: RepositoryConfig) {
        info!("Reconfiguring repository client for {}", config.url);
        self.config = config;
        self.cache.clear();
    }

    /// Drop everything fetched so far
    pub fn clear(&mut self) {
        debug!("Clearing metadata cache for {}", self.config.url);
        self.cache.clear();
    }

    /// `repodata/repomd.xml`
    pub fn repomd(&mut self) -> FetchResult<&RepomdIndex> {
        let fetched = match self.cache.repomd.take() {
            Some(fetched) => fetched,
            None => self.fetch_repomd()?,
        };
        Ok(Fetched::as_ref(self.cache.repomd.insert(fetched)))
    }

    /// RPM packages from the primary catalog
    pub fn packages(&mut self) -> FetchResult<&[PackageRecord]> {
        let fetched = match self.cache.packages.take() {
            Some(fetched) => fetched,
            None => self.fetch_packages()?,
        };
        Ok(Fetched::as_ref(self.cache.packages.insert(fetched)).map(Vec::as_slice))
    }

    /// comps.xml groups; empty when the repository has no comps
    pub fn groups(&mut self) -> FetchResult<&[GroupRecord]> {
        if self.cache.groups.is_none() {
            self.fetch_comps()?;
        }
        match &self.cache.groups {
            Some(fetched) => Ok(fetched.as_ref().map(Vec::as_slice)),
            None => Err(Error::MissingArtifact(GROUP.to_string()).into()),
        }
    }

    /// comps.xml environments; empty when the repository has no comps
    pub fn environments(&mut self) -> FetchResult<&[EnvironmentRecord]> {
        if self.cache.environments.is_none() {
            self.fetch_comps()?;
        }
        match &self.cache.environments {
            Some(fetched) => Ok(fetched.as_ref().map(Vec::as_slice)),
            None => Err(Error::MissingArtifact(GROUP.to_string()).into()),
        }
    }

    /// modulemd streams; empty when the repository is not modular
    pub fn module_streams(&mut self) -> FetchResult<&[ModuleStreamRecord]> {
        let fetched = match self.cache.module_streams.take() {
            Some(fetched) => fetched,
            None => self.fetch_module_streams()?,
        };
        Ok(Fetched::as_ref(self.cache.module_streams.insert(fetched)).map(Vec::as_slice))
    }

    /// The detached `repomd.xml.asc` signature, unverified
    pub fn signature(&mut self) -> FetchResult<&str> {
        let fetched = match self.cache.signature.take() {
            Some(fetched) => fetched,
            None => self.fetch_signature()?,
        };
        Ok(Fetched::as_ref(self.cache.signature.insert(fetched)).map(String::as_str))
    }

    /// Fetch an armored public key from `url`; not memoized
    pub fn gpg_key(&self, url: &str) -> Result<GpgKey> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("'{url}': {e}")))?;
        fetch_gpg_key(&self.transport, &url)
    }

    /// GET `url`, failing on anything but a 2xx response
    fn open(&self, url: &Url) -> std::result::Result<(u16, Box<dyn Read + Send>), FetchError> {
        let response = self.transport.get(url)?;
        if !response.is_success() {
            warn!("GET {} returned HTTP {}", url, response.status);
            let status = Some(response.status);
            return Err(FetchError {
                status,
                source: Error::Transport {
                    status,
                    message: format!("cannot fetch {url}"),
                },
            });
        }
        Ok((response.status, response.body))
    }

    /// URL of a repomd.xml artifact, fetching repomd.xml if needed
    fn artifact_url(&mut self, kind: &str) -> std::result::Result<Option<Url>, FetchError> {
        let href = self.repomd()?.value.location(kind).map(str::to_string);
        match href {
            Some(href) => Ok(Some(join_href(&self.config.base_url()?, &href)?)),
            None => Ok(None),
        }
    }

    fn fetch_repomd(&self) -> FetchResult<RepomdIndex> {
        let url = repomd_url(&self.config.base_url()?)?;
        info!("Fetching repository index from {}", url);

        let (status, body) = self.open(&url)?;
        let index = RepomdIndex::from_reader(body, MAX_REPOMD_SIZE).map_err(|source| {
            FetchError {
                status: Some(status),
                source,
            }
        })?;
        Ok(Fetched {
            value: index,
            status: Some(status),
        })
    }

    fn fetch_packages(&mut self) -> FetchResult<Vec<PackageRecord>> {
        let url = self
            .artifact_url(PRIMARY)?
            .ok_or_else(|| Error::MissingArtifact(PRIMARY.to_string()))?;
        info!("Fetching package catalog from {}", url);

        let (status, body) = self.open(&url)?;
        let packages = decode_primary(body, self.config.max_xml_size).map_err(|failed| {
            warn!(
                "Package catalog decode failed after {} packages",
                failed.partial.len()
            );
            FetchError {
                status: Some(status),
                source: failed.error,
            }
        })?;
        Ok(Fetched {
            value: packages,
            status: Some(status),
        })
    }

    /// Fill both the group and the environment slot from one comps.xml
    fn fetch_comps(&mut self) -> std::result::Result<(), FetchError> {
        let comps = match self.artifact_url(GROUP)? {
            Some(url) => {
                info!("Fetching comps from {}", url);
                let (status, body) = self.open(&url)?;
                let comps = decode_comps(body, self.config.max_xml_size).map_err(|failed| {
                    warn!(
                        "comps.xml decode failed after {} groups and {} environments",
                        failed.partial.groups.len(),
                        failed.partial.environments.len()
                    );
                    FetchError {
                        status: Some(status),
                        source: failed.error,
                    }
                })?;
                Fetched {
                    value: comps,
                    status: Some(status),
                }
            }
            None => {
                debug!("Repository lists no comps.xml");
                Fetched {
                    value: Comps::default(),
                    status: None,
                }
            }
        };

        let status = comps.status;
        let Comps {
            groups,
            environments,
        } = comps.value;
        self.cache.groups = Some(Fetched {
            value: groups,
            status,
        });
        self.cache.environments = Some(Fetched {
            value: environments,
            status,
        });
        Ok(())
    }

    fn fetch_module_streams(&mut self) -> FetchResult<Vec<ModuleStreamRecord>> {
        let Some(url) = self.artifact_url(MODULES)? else {
            debug!("Repository lists no modules.yaml");
            return Ok(Fetched {
                value: Vec::new(),
                status: None,
            });
        };
        info!("Fetching module streams from {}", url);

        let (status, body) = self.open(&url)?;
        let streams =
            decode_module_streams(body, self.config.max_xml_size).map_err(|source| FetchError {
                status: Some(status),
                source,
            })?;
        Ok(Fetched {
            value: streams,
            status: Some(status),
        })
    }

    fn fetch_signature(&self) -> FetchResult<String> {
        let url = signature_url(&repomd_url(&self.config.base_url()?)?);
        info!("Fetching repository signature from {}", url);

        let (status, body) = self.open(&url)?;
        let mut signature = String::new();
        body.take(MAX_SIGNATURE_SIZE)
            .read_to_string(&mut signature)
            .map_err(|e| FetchError {
                status: Some(status),
                source: e.into(),
            })?;
        Ok(Fetched {
            value: signature,
            status: Some(status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_map_keeps_status() {
        let fetched = Fetched {
            value: vec![1, 2, 3],
            status: Some(200),
        };
        let len = fetched.as_ref().map(Vec::len);
        assert_eq!(len, Fetched { value: 3, status: Some(200) });
    }

    #[test]
    fn test_fetch_error_status_from_transport() {
        let err: FetchError = Error::Transport {
            status: Some(503),
            message: "unavailable".to_string(),
        }
        .into();
        assert_eq!(err.status, Some(503));
        assert_eq!(err.to_string(), "transport error (HTTP 503): unavailable");

        let err: FetchError = Error::MissingArtifact(PRIMARY.to_string()).into();
        assert_eq!(err.status, None);
        assert!(err.source.is_missing_artifact());
    }
}
