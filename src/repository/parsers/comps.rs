// src/repository/parsers/comps.rs

//! comps.xml package groups and environments
//!
//! Names and descriptions are repeated once per locale:
//!
//! ```xml
//! <group>
//!   <id>core</id>
//!   <name>Core</name>
//!   <name xml:lang="de">Kern</name>
//!   <description>Smallest possible installation</description>
//!   <packagelist><packagereq type="mandatory">bash</packagereq></packagelist>
//! </group>
//! ```
//!
//! Only the locale-unqualified entry survives decoding.

use std::io::Read;

use tracing::debug;

use super::xml::{CatalogEntry, CatalogReader, Element};
use super::{collect_records, PartialDecode};
use crate::error::{Error, Result};

/// A `<group>` of packages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    /// `<default>` flag, when the group declares one
    pub default: Option<bool>,
    /// `<uservisible>` flag, when the group declares one
    pub user_visible: Option<bool>,
    /// Package names from `<packagelist>`
    pub packages: Vec<String>,
}

/// An installable `<environment>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Group ids from `<grouplist>`
    pub groups: Vec<String>,
    /// Optional group ids from `<optionlist>`
    pub options: Vec<String>,
}

/// Decoded comps.xml, each list in document order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comps {
    pub groups: Vec<GroupRecord>,
    pub environments: Vec<EnvironmentRecord>,
}

/// Either record kind, as the walker meets them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompsEntry {
    Group(GroupRecord),
    Environment(EnvironmentRecord),
}

/// Pick the authoritative text among localized `<tag>` children
///
/// The first entry without `xml:lang` wins; when every entry carries a
/// locale, the first one is used.
fn default_locale<'a>(element: &'a Element, tag: &str) -> Option<&'a str> {
    let mut fallback = None;
    for entry in element.children_named(tag) {
        if entry.lang().is_none() {
            return Some(entry.text.as_str());
        }
        fallback.get_or_insert(entry.text.as_str());
    }
    fallback
}

fn flag(element: &Element, tag: &str) -> Option<bool> {
    element
        .child_text(tag)
        .map(|text| text.trim().eq_ignore_ascii_case("true"))
}

/// Id, name and description shared by both record kinds
fn identity(element: &Element) -> Result<(String, String, String)> {
    let id = element.child_text("id").unwrap_or_default().to_string();
    let name = default_locale(element, "name").ok_or_else(|| {
        Error::decode(format!("comps {} '{}' has no <name>", element.name, id))
    })?;
    let description = default_locale(element, "description").unwrap_or_default();
    Ok((id, name.to_string(), description.to_string()))
}

impl CatalogEntry for CompsEntry {
    fn matches(name: &str) -> bool {
        name == "group" || name == "environment"
    }

    fn from_element(element: &Element) -> Result<Option<Self>> {
        let (id, name, description) = identity(element)?;

        let entry = if element.name == "group" {
            CompsEntry::Group(GroupRecord {
                id,
                name,
                description,
                default: flag(element, "default"),
                user_visible: flag(element, "uservisible"),
                packages: element.list_texts("packagelist", "packagereq"),
            })
        } else {
            CompsEntry::Environment(EnvironmentRecord {
                id,
                name,
                description,
                groups: element.list_texts("grouplist", "groupid"),
                options: element.list_texts("optionlist", "groupid"),
            })
        };
        Ok(Some(entry))
    }
}

impl Comps {
    fn push(&mut self, entry: CompsEntry) {
        match entry {
            CompsEntry::Group(group) => self.groups.push(group),
            CompsEntry::Environment(env) => self.environments.push(env),
        }
    }
}

/// Decode groups and environments from a comps.xml stream in one pass
pub fn decode_comps<'a, R: Read + 'a>(
    reader: R,
    max_size: u64,
) -> std::result::Result<Comps, PartialDecode<Comps>> {
    let entries =
        CatalogReader::<CompsEntry>::new(reader, max_size).map_err(PartialDecode::<Comps>::empty)?;

    let split = |entries: Vec<CompsEntry>| {
        let mut comps = Comps::default();
        entries.into_iter().for_each(|e| comps.push(e));
        comps
    };

    match collect_records(entries) {
        Ok(entries) => {
            let comps = split(entries);
            debug!(
                "Decoded {} groups and {} environments from comps.xml",
                comps.groups.len(),
                comps.environments.len()
            );
            Ok(comps)
        }
        Err(failed) => Err(PartialDecode {
            partial: split(failed.partial),
            error: failed.error,
        }),
    }
}
