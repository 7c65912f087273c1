// src/repository/parsers/primary.rs

//! primary.xml package catalog
//!
//! ```xml
//! <metadata xmlns="http://linux.duke.edu/metadata/common" packages="2">
//!   <package type="rpm">
//!     <name>bash</name>
//!     <arch>x86_64</arch>
//!     <version epoch="0" ver="5.2.26" rel="1.fc40"/>
//!     <checksum type="sha256" pkgid="YES">4c1f...</checksum>
//!     <summary>The GNU Bourne Again shell</summary>
//!     ...
//!   </package>
//! </metadata>
//! ```

use std::fmt;
use std::io::Read;

use tracing::{debug, trace};

use super::xml::{CatalogEntry, CatalogReader, Element};
use super::{collect_records, PartialDecode};
use crate::error::{Error, Result};

/// The only package type kept in decoded catalogs
pub const RPM_PACKAGE_TYPE: &str = "rpm";

/// Epoch, version and release of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackageVersion {
    pub version: String,
    pub release: String,
    pub epoch: i32,
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}-{}", self.version, self.release)
    }
}

/// Package checksum as declared by the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Checksum {
    /// Algorithm tag (`sha256`, `sha1`, ...)
    pub kind: String,
    pub value: String,
}

/// One `<package>` entry of primary.xml
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PackageRecord {
    /// The `type` attribute; always `"rpm"` for decoded records
    pub kind: String,
    pub name: String,
    pub arch: String,
    pub version: PackageVersion,
    pub checksum: Checksum,
    pub summary: String,
}

impl PackageRecord {
    /// `name-[epoch:]version-release.arch`
    pub fn nevra(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.arch)
    }
}

fn parse_epoch(name: &str, raw: Option<&str>) -> Result<i32> {
    match raw.map(str::trim) {
        None | Some("") => Ok(0),
        Some(value) => value.parse::<i32>().map_err(|e| {
            Error::decode(format!("package '{name}': invalid epoch '{value}': {e}"))
        }),
    }
}

impl CatalogEntry for PackageRecord {
    fn matches(name: &str) -> bool {
        name == "package"
    }

    fn from_element(element: &Element) -> Result<Option<Self>> {
        let name = element.child_text("name").unwrap_or_default().to_string();

        let version = match element.child("version") {
            Some(v) => PackageVersion {
                version: v.attr("ver").unwrap_or_default().to_string(),
                release: v.attr("rel").unwrap_or_default().to_string(),
                epoch: parse_epoch(&name, v.attr("epoch"))?,
            },
            None => PackageVersion::default(),
        };

        let checksum = element
            .child("checksum")
            .map(|c| Checksum {
                kind: c.attr("type").unwrap_or_default().to_string(),
                value: c.text.clone(),
            })
            .unwrap_or_default();

        let record = PackageRecord {
            kind: element.attr("type").unwrap_or_default().to_string(),
            name,
            arch: element.child_text("arch").unwrap_or_default().to_string(),
            version,
            checksum,
            summary: element.child_text("summary").unwrap_or_default().to_string(),
        };

        // Decoded in full first, then filtered
        if record.kind != RPM_PACKAGE_TYPE {
            trace!("Skipping package '{}' of type '{}'", record.name, record.kind);
            return Ok(None);
        }
        Ok(Some(record))
    }
}

/// Decode the RPM packages of a (compressed) primary.xml stream
///
/// At most `max_size` decompressed bytes are read; a catalog cut by that
/// ceiling yields the packages that fit, without error.
pub fn decode_primary<'a, R: Read + 'a>(
    reader: R,
    max_size: u64,
) -> std::result::Result<Vec<PackageRecord>, PartialDecode<Vec<PackageRecord>>> {
    let records = CatalogReader::<PackageRecord>::new(reader, max_size)
        .map_err(PartialDecode::<Vec<PackageRecord>>::empty)?;
    let packages = collect_records(records)?;
    debug!("Decoded {} rpm packages from primary.xml", packages.len());
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="3">
<package type="rpm">
  <name>bash</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="5.2.26" rel="1.fc40"/>
  <checksum type="sha256" pkgid="YES">4c1fa2d7</checksum>
  <summary>The GNU Bourne Again shell</summary>
  <format><rpm:license>GPLv3+</rpm:license></format>
</package>
<package type="srpm">
  <name>bash</name>
  <arch>src</arch>
  <version epoch="0" ver="5.2.26" rel="1.fc40"/>
</package>
<package type="rpm">
  <name>perl-Carp</name>
  <arch>noarch</arch>
  <version epoch="1" ver="1.54" rel="502.fc40"/>
  <checksum type="sha1" pkgid="YES">9a8b7c</checksum>
  <summary>Alternative warn &amp; die for modules</summary>
</package>
</metadata>
"#;

    #[test]
    fn test_decode_uncompressed_primary() {
        let packages = decode_primary(PRIMARY.as_bytes(), u64::MAX).unwrap();
        assert_eq!(packages.len(), 2);

        let bash = &packages[0];
        assert_eq!(bash.kind, "rpm");
        assert_eq!(bash.name, "bash");
        assert_eq!(bash.arch, "x86_64");
        assert_eq!(bash.version.version, "5.2.26");
        assert_eq!(bash.version.release, "1.fc40");
        assert_eq!(bash.checksum.kind, "sha256");
        assert_eq!(bash.checksum.value, "4c1fa2d7");
        assert_eq!(bash.nevra(), "bash-5.2.26-1.fc40.x86_64");

        let carp = &packages[1];
        assert_eq!(carp.version.epoch, 1);
        assert_eq!(carp.summary, "Alternative warn & die for modules");
        assert_eq!(carp.nevra(), "perl-Carp-1:1.54-502.fc40.noarch");
    }

    #[test]
    fn test_empty_catalog() {
        let xml = r#"<?xml version="1.0"?><metadata packages="0"></metadata>"#;
        assert!(decode_primary(xml.as_bytes(), u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_missing_epoch_defaults_to_zero() {
        let xml = r#"<metadata><package type="rpm"><name>a</name><version ver="1" rel="2"/></package></metadata>"#;
        let packages = decode_primary(xml.as_bytes(), u64::MAX).unwrap();
        assert_eq!(packages[0].version.epoch, 0);
    }

    #[test]
    fn test_invalid_epoch_keeps_earlier_records() {
        let xml = r#"<metadata>
<package type="rpm"><name>good</name><version epoch="0" ver="1" rel="1"/></package>
<package type="rpm"><name>bad</name><version epoch="one" ver="1" rel="1"/></package>
<package type="rpm"><name>after</name><version epoch="0" ver="1" rel="1"/></package>
</metadata>"#;
        let failed = decode_primary(xml.as_bytes(), u64::MAX).unwrap_err();
        assert_eq!(failed.partial.len(), 1);
        assert_eq!(failed.partial[0].name, "good");
        assert!(matches!(failed.error, Error::Decode(ref msg) if msg.contains("bad")));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let xml = r#"<metadata xmlns="x" packages="1">
<package type="rpm"><name>a</name></arch></package>
</metadata>"#;
        let failed = decode_primary(xml.as_bytes(), u64::MAX).unwrap_err();
        assert!(failed.partial.is_empty());
        assert!(matches!(failed.error, Error::Decode(_)));
    }

    #[test]
    fn test_malformed_srpm_fails_despite_filter() {
        let xml = r#"<metadata>
<package type="rpm"><name>good</name><version epoch="0" ver="1" rel="1"/></package>
<package type="srpm"><name>good</name><arch>src</arch><version epoch="bad" ver="1" rel="1"/></package>
</metadata>"#;
        let failed = decode_primary(xml.as_bytes(), u64::MAX).unwrap_err();
        assert_eq!(failed.partial.len(), 1);
        assert!(matches!(failed.error, Error::Decode(_)));
    }

    #[test]
    fn test_malformed_element_inside_ceiling() {
        let mut xml = String::from("<metadata>\n");
        xml.push_str(r#"<package type="rpm"><name>bad</name></arch></package>"#);
        for i in 0..200 {
            xml.push_str(&format!(
                "\n<package type=\"rpm\"><name>p{i}</name><version epoch=\"0\" ver=\"1\" rel=\"1\"/></package>"
            ));
        }
        xml.push_str("\n</metadata>\n");
        let ceiling = xml.find("<name>p20</name>").unwrap() as u64;
        assert!(ceiling < xml.len() as u64);

        let failed = decode_primary(xml.as_bytes(), ceiling).unwrap_err();
        assert!(failed.partial.is_empty());
        assert!(matches!(failed.error, Error::Decode(_)));
    }

    #[test]
    fn test_ceiling_cuts_quietly() {
        let cut = PRIMARY.find("<package type=\"srpm\">").unwrap() + 20;
        let packages = decode_primary(PRIMARY.as_bytes(), cut as u64).unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "bash");
    }

    #[test]
    fn test_version_display() {
        let v = PackageVersion {
            version: "2.0".to_string(),
            release: "3".to_string(),
            epoch: 0,
        };
        assert_eq!(v.to_string(), "2.0-3");
    }
}
