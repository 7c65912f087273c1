// src/repository/parsers/mod.rs

//! Native decoders for Yum/DNF repodata
//!
//! - [`repomd`]: the repository index (`repodata/repomd.xml`)
//! - [`primary`]: the package catalog, streamed
//! - [`comps`]: package groups and environments, streamed
//! - [`modulemd`]: module streams from `modules.yaml`
//!
//! The XML catalogs are walked element by element (see [`xml`]); a failing
//! element stops the walk and the records decoded before it come back inside
//! a [`PartialDecode`] together with the error.

pub mod comps;
pub mod modulemd;
pub mod primary;
pub mod repomd;
pub mod xml;

use std::fmt;

use crate::error::Error;

pub use comps::{decode_comps, Comps, CompsEntry, EnvironmentRecord, GroupRecord};
pub use modulemd::{decode_module_streams, group_modules, Module, ModuleStreamRecord};
pub use primary::{decode_primary, Checksum, PackageRecord, PackageVersion};
pub use repomd::{RepomdData, RepomdIndex};
pub use xml::{CatalogEntry, CatalogReader, Element};

/// A failed streaming decode and whatever was decoded before the failure
///
/// The call failed; `partial` is informational only.
#[derive(Debug)]
pub struct PartialDecode<T> {
    pub partial: T,
    pub error: Error,
}

impl<T> PartialDecode<T> {
    /// A failure before any record was decoded
    pub fn empty(error: impl Into<Error>) -> Self
    where
        T: Default,
    {
        Self {
            partial: T::default(),
            error: error.into(),
        }
    }
}

impl<T> fmt::Display for PartialDecode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for PartialDecode<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<PartialDecode<T>> for Error {
    fn from(partial: PartialDecode<T>) -> Self {
        partial.error
    }
}

/// Drain a record iterator, keeping what was decoded if it fails midway
pub(crate) fn collect_records<T, I>(records: I) -> Result<Vec<T>, PartialDecode<Vec<T>>>
where
    I: Iterator<Item = crate::error::Result<T>>,
{
    let mut out = Vec::new();
    for record in records {
        match record {
            Ok(record) => out.push(record),
            Err(error) => {
                return Err(PartialDecode {
                    partial: out,
                    error,
                })
            }
        }
    }
    Ok(out)
}
