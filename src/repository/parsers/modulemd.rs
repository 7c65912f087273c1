// src/repository/parsers/modulemd.rs

//! modules.yaml module streams
//!
//! A modules.yaml stream multiplexes several document kinds (`modulemd`,
//! `modulemd-defaults`, `modulemd-obsoletes`, ...) that share no common shape.
//! Decoding therefore runs in two phases:
//!
//! 1. every document is read as a generic [`serde_yaml::Value`];
//! 2. mappings whose `document` key is `modulemd` have their `data` decoded
//!    into [`ModuleStreamRecord`], with loose scalar typing because upstream
//!    files disagree on whether e.g. `version` or `stream` is a number.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::compression;
use crate::error::{Error, Result};

/// Discriminator value of module stream documents
pub const MODULEMD_DOCUMENT: &str = "modulemd";

/// One module stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleStreamRecord {
    pub name: String,
    pub stream: String,
    pub version: String,
    pub context: String,
    pub arch: String,
    pub summary: String,
    pub description: String,
    /// RPM filenames from `artifacts.rpms`
    pub artifacts: Vec<String>,
    /// Profile name to its RPM list
    pub profiles: BTreeMap<String, Vec<String>>,
}

/// A module and all of its streams, in stream order of appearance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub streams: Vec<ModuleStreamRecord>,
}

/// Group stream records by module name, keeping first-seen order
pub fn group_modules(records: Vec<ModuleStreamRecord>) -> Vec<Module> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut modules: Vec<Module> = Vec::new();

    for record in records {
        match index.get(&record.name) {
            Some(&i) => modules[i].streams.push(record),
            None => {
                index.insert(record.name.clone(), modules.len());
                modules.push(Module {
                    name: record.name.clone(),
                    streams: vec![record],
                });
            }
        }
    }
    modules
}

mod weak {
    //! Deserializers that coerce between scalar types

    use std::fmt;

    use serde::de::{self, Deserializer, SeqAccess, Visitor};
    use serde::Deserialize;

    /// A string that also accepts numbers, booleans and null
    #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
    pub struct WeakString(pub String);

    struct WeakStringVisitor;

    impl<'de> Visitor<'de> for WeakStringVisitor {
        type Value = WeakString;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a string or scalar")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(WeakString(v.to_string()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(WeakString(v))
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Ok(WeakString(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(WeakString(v.to_string()))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(WeakString(v.to_string()))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(WeakString(v.to_string()))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(WeakString::default())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(WeakString::default())
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(self)
        }
    }

    impl<'de> Deserialize<'de> for WeakString {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            d.deserialize_any(WeakStringVisitor)
        }
    }

    /// A list of strings; a lone scalar is a one-element list, null is empty
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct WeakList(pub Vec<String>);

    struct WeakListVisitor;

    impl WeakListVisitor {
        fn single<E: de::Error>(value: String) -> Result<WeakList, E> {
            Ok(WeakList(vec![value]))
        }
    }

    impl<'de> Visitor<'de> for WeakListVisitor {
        type Value = WeakList;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of strings or a single scalar")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut items = Vec::new();
            while let Some(WeakString(item)) = seq.next_element()? {
                items.push(item);
            }
            Ok(WeakList(items))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Self::single(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Self::single(v)
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
            Self::single(v.to_string())
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Self::single(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Self::single(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Self::single(v.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(WeakList::default())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(WeakList::default())
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
            d.deserialize_any(self)
        }
    }

    impl<'de> Deserialize<'de> for WeakList {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            d.deserialize_any(WeakListVisitor)
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        WeakString::deserialize(d).map(|s| s.0)
    }

    /// Null-tolerant decode of any defaultable value
    pub fn or_default<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
    }
}

use weak::{WeakList, WeakString};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRpmList {
    #[serde(deserialize_with = "weak::or_default")]
    rpms: WeakList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStream {
    #[serde(deserialize_with = "weak::string")]
    name: String,
    #[serde(deserialize_with = "weak::string")]
    stream: String,
    #[serde(deserialize_with = "weak::string")]
    version: String,
    #[serde(deserialize_with = "weak::string")]
    context: String,
    #[serde(deserialize_with = "weak::string")]
    arch: String,
    #[serde(deserialize_with = "weak::string")]
    summary: String,
    #[serde(deserialize_with = "weak::string")]
    description: String,
    #[serde(deserialize_with = "weak::or_default")]
    artifacts: RawRpmList,
    #[serde(deserialize_with = "weak::or_default")]
    profiles: BTreeMap<WeakString, Option<RawRpmList>>,
}

impl From<RawStream> for ModuleStreamRecord {
    fn from(raw: RawStream) -> Self {
        Self {
            name: raw.name,
            stream: raw.stream,
            version: raw.version,
            context: raw.context,
            arch: raw.arch,
            summary: raw.summary,
            description: raw.description,
            artifacts: raw.artifacts.rpms.0,
            profiles: raw
                .profiles
                .into_iter()
                .map(|(name, list)| (name.0, list.map(|l| l.rpms.0).unwrap_or_default()))
                .collect(),
        }
    }
}

/// Phase 1: split the stream into generic mappings
///
/// Empty documents are skipped. Any document that fails to parse, or that is
/// not a mapping, fails the whole stream.
fn split_documents(text: &str) -> Result<Vec<Mapping>> {
    let mut documents = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document)
            .map_err(|e| Error::decode(format!("modules.yaml document {}: {e}", index + 1)))?;
        match value {
            Value::Mapping(mapping) => documents.push(mapping),
            Value::Null => {}
            _ => {
                return Err(Error::decode(format!(
                    "modules.yaml document {} is not a mapping",
                    index + 1
                )))
            }
        }
    }
    Ok(documents)
}

/// Phase 2: decode a `modulemd` mapping; other document kinds yield `None`
fn decode_document(mut document: Mapping) -> Result<Option<ModuleStreamRecord>> {
    let kind = document.get("document").and_then(Value::as_str);
    if kind != Some(MODULEMD_DOCUMENT) {
        trace!("Skipping modules.yaml document of kind {:?}", kind);
        return Ok(None);
    }

    let data = match document.remove("data") {
        Some(data @ Value::Mapping(_)) => data,
        _ => return Err(Error::decode("modulemd document has no data mapping")),
    };

    let raw: RawStream = serde_yaml::from_value(data)
        .map_err(|e| Error::decode(format!("invalid modulemd data: {e}")))?;
    Ok(Some(raw.into()))
}

/// Drop the trailing document of a stream cut by the size ceiling
///
/// Everything before the last `---` document marker is complete.
fn trim_incomplete_document(bytes: &mut Vec<u8>) {
    let marker_at = |i: usize| {
        bytes[i..].starts_with(b"---")
            && matches!(bytes.get(i + 3), None | Some(b'\n' | b'\r' | b' ' | b'\t'))
    };

    let cut = (1..bytes.len())
        .rev()
        .find(|&i| bytes[i - 1] == b'\n' && marker_at(i))
        .unwrap_or(0);
    bytes.truncate(cut);
}

/// Decode the module streams of a (compressed) modules.yaml stream
///
/// Unlike the XML catalogs there are no partial results: any malformed
/// document fails the call.
pub fn decode_module_streams<'a, R: Read + 'a>(
    reader: R,
    max_size: u64,
) -> Result<Vec<ModuleStreamRecord>> {
    let (_, mut source) = compression::open_bounded(reader, max_size)?;

    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes).map_err(Error::from_read)?;
    if source.ceiling_reached() {
        debug!("modules.yaml cut at {} bytes, dropping trailing document", source.consumed());
        trim_incomplete_document(&mut bytes);
    }

    let text = String::from_utf8(bytes)
        .map_err(|e| Error::decode(format!("modules.yaml is not valid UTF-8: {e}")))?;

    let documents = split_documents(&text)?;
    let total = documents.len();

    let mut streams = Vec::new();
    for document in documents {
        if let Some(stream) = decode_document(document)? {
            streams.push(stream);
        }
    }

    debug!(
        "Decoded {} module streams from {} modules.yaml documents",
        streams.len(),
        total
    );
    Ok(streams)
}
