// src/repository/parsers/xml.rs

//! Streaming XML walk shared by the primary, comps and repomd decoders
//!
//! The walker pulls quick-xml events and only materializes the subtree of a
//! record element the caller asked for. Anything outside such a subtree is
//! skipped token by token, so memory stays bounded by the largest record.

use std::fmt;
use std::io::{self, BufReader, Read};
use std::marker::PhantomData;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::compression::{self, Bounded};
use crate::error::{Error, Result};

/// One materialized element with its attributes, text and children
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name (namespace prefix stripped)
    pub name: String,
    /// Attributes keyed by their qualified name (`xml:lang`, `type`, ...)
    pub attributes: Vec<(String, String)>,
    /// Concatenated character data directly inside this element
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> std::result::Result<Self, WalkError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| WalkError::Syntax(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    /// Attribute value by qualified name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Value of an `xml:lang` (or any `*:lang`) attribute
    pub fn lang(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == "xml:lang" || k.ends_with(":lang"))
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given local name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given local name, in document order
    pub fn children_named<'a, 'n>(
        &'a self,
        name: &'n str,
    ) -> impl Iterator<Item = &'a Element> + use<'a, 'n> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first child with the given local name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Texts of `<list><item/>...</list>` style children
    pub fn list_texts(&self, list: &str, item: &str) -> Vec<String> {
        self.child(list)
            .map(|l| l.children_named(item).map(|i| i.text.clone()).collect())
            .unwrap_or_default()
    }
}

/// Low-level walk failure, classified before it becomes an [`Error`]
#[derive(Debug)]
pub(crate) enum WalkError {
    /// The underlying stream failed; never swallowed
    Io(io::Error),
    /// The compressed data is corrupt or truncated; never swallowed
    Corrupt(String),
    /// Input ended inside an element or a tag
    Truncated(String),
    /// Malformed XML
    Syntax(String),
}

impl fmt::Display for WalkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "{e}"),
            Self::Corrupt(msg) => write!(f, "{msg}"),
            Self::Truncated(what) => write!(f, "unexpected end of document inside {what}"),
            Self::Syntax(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<quick_xml::Error> for WalkError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(e) if compression::decompression_failure(&e).is_some() => {
                Self::Corrupt(e.to_string())
            }
            quick_xml::Error::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            quick_xml::Error::UnexpectedEof(what) => Self::Truncated(what),
            other => Self::Syntax(other.to_string()),
        }
    }
}

impl WalkError {
    pub(crate) fn into_error(self, position: usize) -> Error {
        match self {
            Self::Io(e) => Error::Io(e),
            other => Error::decode(format!("{other} (at byte {position})")),
        }
    }
}

/// Pull-based walker over a bounded, decompressed XML stream
pub(crate) struct XmlWalker<'a> {
    reader: Reader<BufReader<Bounded<Box<dyn Read + 'a>>>>,
    buf: Vec<u8>,
}

impl<'a> XmlWalker<'a> {
    pub(crate) fn new(source: Bounded<Box<dyn Read + 'a>>) -> Self {
        let mut reader = Reader::from_reader(BufReader::new(source));
        reader.trim_text(true);
        reader.expand_empty_elements(true);
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.reader.buffer_position()
    }

    /// Whether the walk has consumed everything up to a size-ceiling cut
    ///
    /// Only then can a truncation or syntax error be blamed on the cut.
    pub(crate) fn at_cut(&self) -> bool {
        let buffered = self.reader.get_ref();
        buffered.buffer().is_empty() && buffered.get_ref().ceiling_reached()
    }

    /// Advance to the next start tag anywhere in the document
    ///
    /// Returns the element header with no children; `None` at end of input.
    pub(crate) fn next_start(&mut self) -> std::result::Result<Option<Element>, WalkError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(start) => return Element::from_start(&start).map(Some),
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Materialize the subtree of `root`, whose start tag was just read
    pub(crate) fn read_subtree(&mut self, root: Element) -> std::result::Result<Element, WalkError> {
        let root_name = root.name.clone();
        let mut stack = vec![root];

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::End(_) => {
                    let Some(done) = stack.pop() else {
                        return Err(WalkError::Syntax(format!("unbalanced </{root_name}>")));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Event::CData(data) => {
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| WalkError::Syntax(format!("invalid UTF-8 in CDATA: {e}")))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(text);
                    }
                }
                Event::Eof => return Err(WalkError::Truncated(format!("<{root_name}>"))),
                _ => {}
            }
        }
    }
}

/// A record type the catalog walker can extract
pub trait CatalogEntry: Sized {
    /// Whether an element with this local name starts a record
    fn matches(name: &str) -> bool;

    /// Convert a materialized element; `Ok(None)` drops it
    fn from_element(element: &Element) -> Result<Option<Self>>;
}

/// Iterator over the records of a (possibly huge) catalog document
///
/// Yields records in document order. After the first error the iterator is
/// exhausted. When the size ceiling cut the document, the truncation shows up
/// as a quiet end of iteration, not as an error.
pub struct CatalogReader<'a, T> {
    walker: XmlWalker<'a>,
    done: bool,
    decoded: usize,
    _record: PhantomData<T>,
}

impl<'a, T: CatalogEntry> CatalogReader<'a, T> {
    /// Sniff and decompress `reader`, capping output at `max_size` bytes
    pub fn new<R: Read + 'a>(reader: R, max_size: u64) -> Result<Self> {
        let (_, source) = compression::open_bounded(reader, max_size)?;
        Ok(Self::from_bounded(source))
    }

    /// Walk an already decompressed stream
    pub fn from_bounded(source: Bounded<Box<dyn Read + 'a>>) -> Self {
        Self {
            walker: XmlWalker::new(source),
            done: false,
            decoded: 0,
            _record: PhantomData,
        }
    }

    fn fail(&mut self, err: WalkError) -> Option<Result<T>> {
        self.done = true;
        match err {
            WalkError::Io(e) => Some(Err(Error::Io(e))),
            WalkError::Truncated(_) | WalkError::Syntax(_) if self.walker.at_cut() => {
                debug!(
                    "Size ceiling reached after {} records, stopping ({})",
                    self.decoded, err
                );
                None
            }
            other => Some(Err(other.into_error(self.walker.position()))),
        }
    }
}

impl<T: CatalogEntry> Iterator for CatalogReader<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let start = match self.walker.next_start() {
                Ok(Some(start)) => start,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => return self.fail(e),
            };

            if !T::matches(&start.name) {
                continue;
            }

            let element = match self.walker.read_subtree(start) {
                Ok(element) => element,
                Err(e) => return self.fail(e),
            };

            match T::from_element(&element) {
                Ok(Some(record)) => {
                    self.decoded += 1;
                    return Some(Ok(record));
                }
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
