// src/repository/mod.rs

//! Yum/DNF repository metadata
//!
//! This module provides:
//! - Native decoders for repodata (see [`parsers`])
//! - A memoizing client that resolves and fetches each artifact
//! - Pluggable transport, with a reqwest implementation
//! - GPG key fetching and syntactic validation

mod client;
mod config;
mod transport;

pub mod gpg;
pub mod parsers;

pub use client::{FetchError, FetchResult, Fetched, RepositoryClient};
pub use config::{join_href, repomd_url, signature_url, RepositoryConfig, DEFAULT_TIMEOUT_SECS};
pub use gpg::{fetch_gpg_key, GpgKey};
pub use parsers::{
    decode_comps, decode_module_streams, decode_primary, group_modules, Comps, EnvironmentRecord,
    GroupRecord, Module, ModuleStreamRecord, PackageRecord, PartialDecode, RepomdIndex,
};
pub use transport::{HttpTransport, Response, Transport};
