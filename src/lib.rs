// src/lib.rs

//! rpmrepo: Yum/DNF repository metadata
//!
//! Fetches and decodes the metadata of RPM package repositories: the
//! `repomd.xml` index, the `primary.xml` package catalog, `comps.xml` groups
//! and environments, `modules.yaml` module streams, and the detached
//! signature and public key.
//!
//! # Architecture
//!
//! - Sniffing: the compression format is read from the first bytes, never
//!   from file names
//! - Bounded: every artifact is cut at a decompressed byte ceiling, quietly
//! - Streaming: XML catalogs are decoded one element at a time
//! - Two-phase YAML: module documents are inspected generically before any
//!   typed decode

pub mod compression;
mod error;
pub mod repository;

pub use compression::{CompressionFormat, DEFAULT_MAX_XML_SIZE};
pub use error::{Error, Result};
pub use repository::{
    Fetched, FetchError, FetchResult, HttpTransport, RepositoryClient, RepositoryConfig, Transport,
};
