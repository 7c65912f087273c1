// src/repository/parsers/repomd.rs

//! repomd.xml repository index

use std::io::{Cursor, Read};

use tracing::debug;

use super::xml::XmlWalker;
use crate::compression::Bounded;
use crate::error::{Error, Result};

/// Artifact type of the package catalog
pub const PRIMARY: &str = "primary";
/// Artifact type of comps.xml
pub const GROUP: &str = "group";
/// Artifact type of modules.yaml
pub const MODULES: &str = "modules";

/// Largest repomd.xml accepted (16 MiB)
///
/// The index is a few kilobytes and never compressed, so it does not share
/// the catalog ceiling.
pub const MAX_REPOMD_SIZE: u64 = 16 * 1024 * 1024;

/// One `<data type="..."><location href="..."/></data>` entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepomdData {
    pub kind: String,
    pub href: String,
}

/// Decoded repomd.xml plus the exact text it came from
///
/// The raw text is what a detached `repomd.xml.asc` signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdIndex {
    pub namespace: Option<String>,
    pub revision: String,
    pub data: Vec<RepomdData>,
    raw: String,
}

impl RepomdIndex {
    /// Parse a complete repomd.xml document
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        let root = {
            let source: Box<dyn Read + '_> = Box::new(Cursor::new(raw.as_bytes()));
            let mut walker = XmlWalker::new(Bounded::new(source, u64::MAX));
            let start = walker
                .next_start()
                .map_err(|e| e.into_error(walker.position()))?
                .ok_or_else(|| Error::decode("repomd.xml has no root element"))?;
            if start.name != "repomd" {
                return Err(Error::decode(format!(
                    "expected <repomd> root element, found <{}>",
                    start.name
                )));
            }
            walker
                .read_subtree(start)
                .map_err(|e| e.into_error(walker.position()))?
        };

        let data = root
            .children_named("data")
            .map(|d| RepomdData {
                kind: d.attr("type").unwrap_or_default().to_string(),
                href: d
                    .child("location")
                    .and_then(|l| l.attr("href"))
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect::<Vec<_>>();

        debug!("Parsed repomd.xml with {} data entries", data.len());

        Ok(Self {
            namespace: root.attr("xmlns").map(str::to_string),
            revision: root.child_text("revision").unwrap_or_default().to_string(),
            data,
            raw,
        })
    }

    /// Read and parse repomd.xml, refusing more than `max_size` bytes
    ///
    /// A longer document is a decode error rather than a truncated parse.
    pub fn from_reader<R: Read>(reader: R, max_size: u64) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .take(max_size.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max_size {
            return Err(Error::decode(format!("repomd.xml exceeds {max_size} bytes")));
        }
        let raw = String::from_utf8(bytes)
            .map_err(|e| Error::decode(format!("repomd.xml is not valid UTF-8: {e}")))?;
        Self::parse(raw)
    }

    /// The document exactly as fetched
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Href of the given artifact type
    ///
    /// With duplicate entries the last one wins. An entry with an empty href
    /// counts as absent.
    pub fn location(&self, kind: &str) -> Option<&str> {
        self.data
            .iter()
            .rev()
            .find(|d| d.kind == kind)
            .map(|d| d.href.as_str())
            .filter(|href| !href.is_empty())
    }

    /// Like [`RepomdIndex::location`], failing with `MissingArtifact`
    pub fn require(&self, kind: &str) -> Result<&str> {
        self.location(kind)
            .ok_or_else(|| Error::MissingArtifact(kind.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1308257578</revision>
  <data type="other">
    <checksum type="sha256">aa</checksum>
    <location href="repodata/other.xml.gz"/>
    <timestamp>1308257578</timestamp>
  </data>
  <data type="filelists">
    <location href="repodata/filelists.xml.gz"/>
  </data>
  <data type="primary">
    <location href="repodata/primary.xml.gz"/>
  </data>
  <data type="group">
    <location href="repodata/comps.xml"/>
  </data>
  <data type="updateinfo">
    <location href="repodata/updateinfo.xml.gz"/>
  </data>
</repomd>
"#;

    #[test]
    fn test_parse_repomd() {
        let index = RepomdIndex::parse(REPOMD).unwrap();
        assert_eq!(index.revision, "1308257578");
        assert_eq!(
            index.namespace.as_deref(),
            Some("http://linux.duke.edu/metadata/repo")
        );

        let kinds: Vec<&str> = index.data.iter().map(|d| d.kind.as_str()).collect();
        assert_eq!(kinds, ["other", "filelists", "primary", "group", "updateinfo"]);

        assert_eq!(index.location(PRIMARY), Some("repodata/primary.xml.gz"));
        assert_eq!(index.location(GROUP), Some("repodata/comps.xml"));
        assert_eq!(index.location("updateinfo"), Some("repodata/updateinfo.xml.gz"));
    }

    #[test]
    fn test_raw_text_is_preserved() {
        let index = RepomdIndex::from_reader(REPOMD.as_bytes(), 1024 * 1024).unwrap();
        assert_eq!(index.raw(), REPOMD);
        assert_eq!(index.raw().as_bytes(), REPOMD.as_bytes());
    }

    #[test]
    fn test_oversized_repomd_is_refused() {
        let limit = REPOMD.len() as u64;
        assert!(RepomdIndex::from_reader(REPOMD.as_bytes(), limit).is_ok());

        let err = RepomdIndex::from_reader(REPOMD.as_bytes(), limit - 1).unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("exceeds")));
    }

    #[test]
    fn test_missing_type() {
        let index = RepomdIndex::parse(REPOMD).unwrap();
        assert_eq!(index.location(MODULES), None);

        let err = index.require(MODULES).unwrap_err();
        assert!(err.is_missing_artifact());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_last_duplicate_wins() {
        let xml = r#"<repomd>
<data type="primary"><location href="old/primary.xml.gz"/></data>
<data type="primary"><location href="new/primary.xml.zst"/></data>
</repomd>"#;
        let index = RepomdIndex::parse(xml).unwrap();
        assert_eq!(index.data.len(), 2);
        assert_eq!(index.location(PRIMARY), Some("new/primary.xml.zst"));
    }

    #[test]
    fn test_wrong_root_element() {
        let err = RepomdIndex::parse("<metadata></metadata>").unwrap_err();
        assert!(matches!(err, Error::Decode(ref msg) if msg.contains("<metadata>")));
    }

    #[test]
    fn test_truncated_repomd() {
        let cut = &REPOMD[..REPOMD.len() / 2];
        assert!(matches!(RepomdIndex::parse(cut), Err(Error::Decode(_))));
    }
}
