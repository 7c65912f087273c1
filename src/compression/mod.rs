// src/compression/mod.rs

//! Compression detection and bounded decompression
//!
//! Repository catalogs arrive gzip, xz or zstd compressed, or as plain text.
//! The format is sniffed from a fixed-size prefix of the stream and the
//! decompressed output is capped by a byte ceiling (see [`limit::Bounded`]).

pub mod limit;

use std::io::{self, Cursor, Read};
use thiserror::Error;
use tracing::debug;

pub use limit::Bounded;

/// Number of bytes inspected when sniffing a stream
pub const SNIFF_LEN: usize = 20;

/// Default ceiling on decompressed metadata (512 MiB)
pub const DEFAULT_MAX_XML_SIZE: u64 = 512 * 1024 * 1024;

/// Compression-related errors
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Failed to create {format} decoder: {source}")]
    DecoderCreation {
        format: &'static str,
        source: io::Error,
    },

    #[error("Failed to decompress {format} data: {source}")]
    Decompression {
        format: &'static str,
        source: io::Error,
    },

    #[error("Unsupported compression format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream too short to sniff: needed {needed} bytes, found {found}")]
    ShortHeader { needed: usize, found: usize },

    #[error("Failed to read stream header: {0}")]
    Io(#[from] io::Error),
}

/// Supported compression formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// No compression (raw data)
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstandard compression (.zst)
    Zstd,
}

impl CompressionFormat {
    /// Detect compression format from magic bytes
    ///
    /// Inspects the first few bytes of data to identify the compression format.
    ///
    /// Magic bytes:
    /// - Gzip: `1f 8b`
    /// - XZ: `fd 37 7a 58 5a 00` (FD + "7zXZ" + NUL)
    /// - Zstd: `28 b5 2f fd`
    ///
    /// Returns `None` when no magic matches; that alone does not mean the data
    /// is uncompressed, see [`CompressionFormat::sniff`].
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x1f, 0x8b]) {
            Some(Self::Gzip)
        } else if data.starts_with(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00]) {
            Some(Self::Xz)
        } else if data.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Self::Zstd)
        } else {
            None
        }
    }

    /// Classify a stream prefix
    ///
    /// A known magic selects its decoder. Without one, a prefix that reads as
    /// UTF-8 text is taken as uncompressed XML/YAML; anything else (including
    /// compressors we do not decode, like bzip2 or lz4) is rejected.
    pub fn sniff(prefix: &[u8]) -> Result<Self, CompressionError> {
        if let Some(format) = Self::from_magic_bytes(prefix) {
            return Ok(format);
        }
        if let Some(name) = unsupported_magic(prefix) {
            return Err(CompressionError::UnsupportedFormat(format!(
                "{name} (must be gzip, xz, zstd or uncompressed)"
            )));
        }
        if looks_like_text(prefix) {
            return Ok(Self::None);
        }
        Err(CompressionError::UnsupportedFormat(format!(
            "unrecognized header {}",
            hex_prefix(prefix)
        )))
    }

    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn unsupported_magic(data: &[u8]) -> Option<&'static str> {
    if data.len() >= 4 && data.starts_with(b"BZh") && (b'1'..=b'9').contains(&data[3]) {
        Some("bzip2")
    } else if data.starts_with(&[0x04, 0x22, 0x4d, 0x18]) {
        Some("lz4")
    } else if data.starts_with(b"PK\x03\x04") {
        Some("zip")
    } else {
        None
    }
}

fn looks_like_text(data: &[u8]) -> bool {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        // A multi-byte character cut by the prefix boundary is still text
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&data[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    text.chars().all(|c| !c.is_control() || c.is_whitespace())
}

fn hex_prefix(data: &[u8]) -> String {
    data.iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// An error raised by the compressed input itself, not by the decoder
#[derive(Error, Debug)]
#[error(transparent)]
struct SourceError(io::Error);

/// Marks errors coming out of the raw input stream
struct SourceReader<R>(R);

impl<R: Read> Read for SourceReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| match e.kind() {
            io::ErrorKind::Interrupted => e,
            kind => io::Error::new(kind, SourceError(e)),
        })
    }
}

/// Decoder output; decoder failures carry a [`CompressionError::Decompression`]
struct DecoderReader<D> {
    inner: D,
    format: CompressionFormat,
}

impl<D: Read> Read for DecoderReader<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| classify_decoder_error(e, self.format))
    }
}

fn classify_decoder_error(err: io::Error, format: CompressionFormat) -> io::Error {
    let kind = err.kind();
    if kind == io::ErrorKind::Interrupted {
        return err;
    }
    if err.get_ref().is_some_and(|inner| inner.is::<SourceError>()) {
        return match err.into_inner().map(|inner| inner.downcast::<SourceError>()) {
            Some(Ok(source)) => source.0,
            _ => io::Error::from(kind),
        };
    }
    io::Error::new(
        kind,
        CompressionError::Decompression {
            format: format.name(),
            source: err,
        },
    )
}

/// The decompression failure carried by a read error, if any
///
/// Errors from the compressed input (a cancelled or failed fetch) carry none
/// and should be reported as I/O errors.
pub fn decompression_failure(err: &io::Error) -> Option<&CompressionError> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<CompressionError>())
        .filter(|inner| matches!(inner, CompressionError::Decompression { .. }))
}

/// A stream whose sniffed prefix has been put back in front of the remainder
pub type Sniffed<R> = io::Chain<Cursor<Vec<u8>>, R>;

/// Read the first [`SNIFF_LEN`] bytes and classify the stream
///
/// The prefix is not lost: the returned reader yields it again before the
/// rest of the input. Fewer than [`SNIFF_LEN`] available bytes is an error.
pub fn sniff_stream<R: Read>(mut reader: R) -> Result<(CompressionFormat, Sniffed<R>), CompressionError> {
    let mut prefix = vec![0u8; SNIFF_LEN];
    let mut filled = 0;

    while filled < SNIFF_LEN {
        match reader.read(&mut prefix[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CompressionError::Io(e)),
        }
    }

    if filled < SNIFF_LEN {
        return Err(CompressionError::ShortHeader {
            needed: SNIFF_LEN,
            found: filled,
        });
    }

    let format = CompressionFormat::sniff(&prefix)?;
    Ok((format, Cursor::new(prefix).chain(reader)))
}

/// Create a decompressing reader for the given format
///
/// Returns a boxed `Read` implementation that decompresses data on the fly.
/// For `CompressionFormat::None`, returns the reader unchanged. Corrupt or
/// truncated compressed data fails reads with an error that
/// [`decompression_failure`] recognizes; errors of `reader` itself pass
/// through unchanged.
pub fn create_decoder<'a, R: Read + 'a>(
    reader: R,
    format: CompressionFormat,
) -> Result<Box<dyn Read + 'a>, CompressionError> {
    match format {
        CompressionFormat::None => Ok(Box::new(reader)),
        CompressionFormat::Gzip => Ok(decoded(
            flate2::read::GzDecoder::new(SourceReader(reader)),
            format,
        )),
        CompressionFormat::Xz => Ok(decoded(
            xz2::read::XzDecoder::new(SourceReader(reader)),
            format,
        )),
        CompressionFormat::Zstd => {
            let decoder = zstd::Decoder::new(SourceReader(reader)).map_err(|e| {
                CompressionError::DecoderCreation {
                    format: "zstd",
                    source: e,
                }
            })?;
            Ok(decoded(decoder, format))
        }
    }
}

fn decoded<'a, D: Read + 'a>(inner: D, format: CompressionFormat) -> Box<dyn Read + 'a> {
    Box::new(DecoderReader { inner, format })
}

/// Sniff, decompress and cap a metadata stream
///
/// Reading past `max_size` decompressed bytes yields end-of-stream; the
/// returned [`Bounded`] reports whether that happened.
pub fn open_bounded<'a, R: Read + 'a>(
    reader: R,
    max_size: u64,
) -> Result<(CompressionFormat, Bounded<Box<dyn Read + 'a>>), CompressionError> {
    let (format, stream) = sniff_stream(reader)?;
    debug!("Detected {} metadata stream (ceiling {} bytes)", format, max_size);
    let decoder = create_decoder(stream, format)?;
    Ok((format, Bounded::new(decoder, max_size)))
}
