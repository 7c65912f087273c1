// src/repository/gpg.rs

//! Repository GPG public keys
//!
//! Keys are only checked for syntax: the blob must be an ASCII-armored key
//! ring that sequoia-openpgp can parse into at least one certificate. Whether
//! to trust it is the caller's decision.

use std::io::Read;

use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use sequoia_openpgp as openpgp;
use tracing::{debug, info};
use url::Url;

use super::transport::Transport;
use crate::error::{Error, Result};

const ARMOR_HEADER: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";

/// Ceiling on key blobs; real key rings are a few KiB
const MAX_KEY_SIZE: u64 = 1024 * 1024;

/// An armored public key ring and the fingerprints it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpgKey {
    pub armored: String,
    pub fingerprints: Vec<String>,
}

impl GpgKey {
    pub fn parse(armored: impl Into<String>) -> Result<Self> {
        let armored = armored.into();
        if !armored.contains(ARMOR_HEADER) {
            return Err(Error::InvalidKey("not an armored public key block".to_string()));
        }

        let parser = CertParser::from_bytes(armored.as_bytes())
            .map_err(|e| Error::InvalidKey(format!("failed to parse key ring: {e}")))?;

        let mut fingerprints = Vec::new();
        for cert in parser {
            let cert =
                cert.map_err(|e| Error::InvalidKey(format!("failed to parse certificate: {e}")))?;
            debug!("Parsed GPG key with fingerprint: {}", cert.fingerprint());
            fingerprints.push(cert.fingerprint().to_string());
        }

        if fingerprints.is_empty() {
            return Err(Error::InvalidKey("key ring contains no certificates".to_string()));
        }
        Ok(Self {
            armored,
            fingerprints,
        })
    }
}

/// Fetch and validate the key at `url`
pub fn fetch_gpg_key<T: Transport + ?Sized>(transport: &T, url: &Url) -> Result<GpgKey> {
    let response = transport.get(url)?;
    if !response.is_success() {
        return Err(Error::Transport {
            status: Some(response.status),
            message: format!("cannot fetch GPG key from {url}"),
        });
    }

    let mut armored = String::new();
    response.body.take(MAX_KEY_SIZE).read_to_string(&mut armored)?;

    let key = GpgKey::parse(armored)?;
    info!("Fetched GPG key from {} ({} certificates)", url, key.fingerprints.len());
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openpgp::cert::CertBuilder;
    use openpgp::serialize::SerializeInto;

    fn armored_key() -> (String, String) {
        let (cert, _) = CertBuilder::general_purpose(None, Some("Repo <repo@example.com>"))
            .generate()
            .unwrap();
        let armored = String::from_utf8(cert.armored().to_vec().unwrap()).unwrap();
        (armored, cert.fingerprint().to_string())
    }

    #[test]
    fn test_parse_generated_key() {
        let (armored, fingerprint) = armored_key();
        let key = GpgKey::parse(armored.clone()).unwrap();
        assert_eq!(key.fingerprints, vec![fingerprint]);
        assert_eq!(key.armored, armored);
    }

    #[test]
    fn test_reject_garbage() {
        assert!(matches!(GpgKey::parse(""), Err(Error::InvalidKey(_))));
        assert!(matches!(GpgKey::parse("hello world"), Err(Error::InvalidKey(_))));

        let broken = format!("{ARMOR_HEADER}\n\nnot base64 at all!!\n-----END PGP PUBLIC KEY BLOCK-----\n");
        assert!(matches!(GpgKey::parse(broken), Err(Error::InvalidKey(_))));
    }
}
