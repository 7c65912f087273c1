// src/repository/config.rs

//! Repository configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! url = "https://mirror.example.com/fedora/40/x86_64/os/"
//! max_xml_size = 536870912
//! timeout_secs = 30
//! ```

use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::compression::DEFAULT_MAX_XML_SIZE;
use crate::error::{Error, Result};

/// Default timeout for HTTP requests in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_user_agent() -> String {
    format!("rpmrepo/{}", env!("CARGO_PKG_VERSION"))
}

/// Where a repository lives and how much of it to read
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Base URL; `repodata/repomd.xml` is resolved below it
    pub url: String,
    /// Ceiling on decompressed bytes read from any one artifact
    pub max_xml_size: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_xml_size: DEFAULT_MAX_XML_SIZE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
        }
    }
}

impl RepositoryConfig {
    /// Configuration for `url` with every other field defaulted
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.max_xml_size == 0 {
            return Err(Error::Config("max_xml_size must be greater than zero".to_string()));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// The base URL, normalized to end in `/`
    pub fn base_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::InvalidUrl(format!("'{}': {e}", self.url)))?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(format!("'{}' cannot be a base URL", self.url)));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

/// Join a repomd href below the base URL
///
/// Leading slashes on `href` are dropped so exactly one separator remains.
/// Percent escapes already present in `href` are kept as they are.
pub fn join_href(base: &Url, href: &str) -> Result<Url> {
    let relative = href.trim_start_matches('/');
    base.join(relative)
        .map_err(|e| Error::InvalidUrl(format!("cannot join '{href}' to '{base}': {e}")))
}

/// `<base>/repodata/repomd.xml`
pub fn repomd_url(base: &Url) -> Result<Url> {
    join_href(base, "repodata/repomd.xml")
}

/// The detached signature next to repomd.xml
pub fn signature_url(repomd: &Url) -> Url {
    let mut url = repomd.clone();
    url.set_path(&format!("{}.asc", repomd.path()));
    url
}
