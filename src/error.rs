// src/error.rs

//! Crate-wide error type

use thiserror::Error;

use crate::compression::{self, CompressionError};

/// Result type for repository metadata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while fetching or decoding repository metadata
#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or non-success HTTP status
    ///
    /// `status` is `None` when no response was received at all.
    #[error("transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// Sniffing found no supported compression magic
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// Structural XML/YAML decode failure
    #[error("decode error: {0}")]
    Decode(String),

    /// repomd.xml has no entry of the requested type
    #[error("repomd.xml has no '{0}' entry")]
    MissingArtifact(String),

    /// Base URL or joined artifact URL is not valid
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// GPG key blob is not an armored key ring
    #[error("invalid GPG key: {0}")]
    InvalidKey(String),

    /// IO error from the underlying stream
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// Configuration file is not valid TOML
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl Error {
    /// Create a decode error with a message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// HTTP status carried by a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Classify a read error from a decompressing stream
    ///
    /// Corrupt or truncated compressed data is a decode failure; anything
    /// else came from the input stream and stays an I/O error.
    pub fn from_read(err: std::io::Error) -> Self {
        if compression::decompression_failure(&err).is_some() {
            Self::Decode(err.to_string())
        } else {
            Self::Io(err)
        }
    }

    /// Whether this error means an artifact is absent from repomd.xml
    pub fn is_missing_artifact(&self) -> bool {
        matches!(self, Self::MissingArtifact(_))
    }
}

impl From<CompressionError> for Error {
    fn from(err: CompressionError) -> Self {
        match err {
            CompressionError::UnsupportedFormat(desc) => Self::UnsupportedFormat(desc),
            CompressionError::ShortHeader { .. } => Self::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                err.to_string(),
            )),
            CompressionError::Decompression { .. } => Self::Decode(err.to_string()),
            CompressionError::Io(source) => Self::Io(source),
            CompressionError::DecoderCreation { source, .. } => Self::Io(source),
        }
    }
}
