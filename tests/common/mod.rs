// tests/common/mod.rs

//! Shared fixtures for integration tests: catalog builders, compressors and
//! an in-memory transport.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};

use rpmrepo::repository::Response;
use rpmrepo::{CompressionFormat, Error, Result, Transport};
use url::Url;

pub const BASE_URL: &str = "http://foo.example.com/repo/";

/// primary.xml with `rpms` RPM packages followed by `others` source packages
pub fn primary_xml(rpms: usize, others: usize) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <metadata xmlns=\"http://linux.duke.edu/metadata/common\" \
         xmlns:rpm=\"http://linux.duke.edu/metadata/rpm\" packages=\"{}\">\n",
        rpms + others
    );
    for i in 0..rpms {
        xml.push_str(&format!(
            r#"<package type="rpm">
  <name>pkg{i}</name>
  <arch>x86_64</arch>
  <version epoch="{epoch}" ver="1.{i}" rel="1.el9"/>
  <checksum type="sha1" pkgid="YES">{sum:040x}</checksum>
  <summary>Test package number {i}</summary>
  <description>A package used to exercise the primary.xml decoder.</description>
  <format>
    <rpm:license>MIT</rpm:license>
    <rpm:provides><rpm:entry name="pkg{i}" flags="EQ" ver="1.{i}"/></rpm:provides>
  </format>
</package>
"#,
            epoch = i % 2,
            sum = i * 7919 + 1,
        ));
    }
    for i in 0..others {
        xml.push_str(&format!(
            r#"<package type="srpm">
  <name>pkg{i}</name>
  <arch>src</arch>
  <version epoch="0" ver="1.{i}" rel="1.el9"/>
</package>
"#
        ));
    }
    xml.push_str("</metadata>\n");
    xml
}

pub const COMPS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE comps PUBLIC "-//CentOS//DTD Comps info//EN" "comps.dtd">
<comps>
  <group>
    <id>development</id>
    <name>Development Tools</name>
    <name xml:lang="ja">開発ツール</name>
    <description>A basic development environment.</description>
    <description xml:lang="ja">基本的な開発環境です。</description>
    <default>false</default>
    <uservisible>true</uservisible>
    <packagelist>
      <packagereq type="mandatory">gcc</packagereq>
      <packagereq type="default">make</packagereq>
    </packagelist>
  </group>
  <environment>
    <id>server-product-environment</id>
    <name>Server</name>
    <name xml:lang="de">Server</name>
    <description>An integrated, easy-to-manage server.</description>
    <grouplist><groupid>development</groupid></grouplist>
  </environment>
</comps>
"#;

pub const MODULES_YAML: &str = r#"---
document: modulemd
version: 2
data:
  name: postgresql
  stream: 15
  version: 9020020230101000000
  context: rhel9
  arch: x86_64
  summary: PostgreSQL server and client module
  description: PostgreSQL is an advanced object-relational database.
  profiles:
    server:
      rpms: [postgresql-server]
    client:
      rpms: postgresql
  artifacts:
    rpms:
    - postgresql-0:15.2-1.module+el9.x86_64
...
---
document: modulemd-defaults
version: 1
data:
  module: postgresql
  stream: 15
...
---
document: modulemd
version: 2
data:
  name: postgresql
  stream: "16"
  version: 9040020240101000000
  context: rhel9
  arch: x86_64
  summary: PostgreSQL server and client module
...
---
document: modulemd-obsoletes
version: 1
data:
  module: postgresql
  stream: "12"
...
"#;

/// repomd.xml listing the given (type, href) pairs
pub fn repomd_xml(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n  <revision>1700000000</revision>\n",
    );
    for (kind, href) in entries {
        xml.push_str(&format!(
            "  <data type=\"{kind}\">\n    <location href=\"{href}\"/>\n  </data>\n"
        ));
    }
    xml.push_str("</repomd>\n");
    xml
}

/// Compress `data` with the given format
pub fn compress(format: CompressionFormat, data: &[u8]) -> Vec<u8> {
    match format {
        CompressionFormat::None => data.to_vec(),
        CompressionFormat::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        CompressionFormat::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        CompressionFormat::Zstd => zstd::encode_all(Cursor::new(data), 3).unwrap(),
    }
}

/// Yields `prefix`, then fails every read with a cancellation error
pub struct CancelledReader {
    prefix: Cursor<Vec<u8>>,
}

impl CancelledReader {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: Cursor::new(prefix.into()),
        }
    }
}

impl Read for CancelledReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.prefix.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::TimedOut, "request cancelled")),
            n => Ok(n),
        }
    }
}

/// In-memory transport; unknown URLs answer 404, unreachable hosts fail
#[derive(Default)]
pub struct MemoryTransport {
    responses: HashMap<String, (u16, Vec<u8>)>,
    unreachable: Vec<String>,
    requests: RefCell<Vec<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.to_string(), (200, body.into()));
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), (status, Vec::new()));
        self
    }

    pub fn unreachable(mut self, host: &str) -> Self {
        self.unreachable.push(host.to_string());
        self
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|r| *r == url).count()
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &Url) -> Result<Response> {
        self.requests.borrow_mut().push(url.to_string());

        if url
            .host_str()
            .is_some_and(|host| self.unreachable.iter().any(|h| h == host))
        {
            return Err(Error::Transport {
                status: None,
                message: format!("connection refused: {url}"),
            });
        }

        let (status, body) = self
            .responses
            .get(url.as_str())
            .cloned()
            .unwrap_or((404, Vec::new()));
        Ok(Response {
            status,
            body: Box::new(Cursor::new(body)),
        })
    }
}

/// A repository serving primary (gzip), comps and modules (zstd)
pub fn full_repository(rpms: usize) -> MemoryTransport {
    let repomd = repomd_xml(&[
        ("primary", "repodata/primary.xml.gz"),
        ("group", "repodata/comps.xml"),
        ("modules", "repodata/modules.yaml.zst"),
    ]);
    MemoryTransport::new()
        .serve(&format!("{BASE_URL}repodata/repomd.xml"), repomd)
        .serve(
            &format!("{BASE_URL}repodata/repomd.xml.asc"),
            "-----BEGIN PGP SIGNATURE-----\n\nabc\n-----END PGP SIGNATURE-----\n",
        )
        .serve(
            &format!("{BASE_URL}repodata/primary.xml.gz"),
            compress(CompressionFormat::Gzip, primary_xml(rpms, 1).as_bytes()),
        )
        .serve(&format!("{BASE_URL}repodata/comps.xml"), COMPS_XML)
        .serve(
            &format!("{BASE_URL}repodata/modules.yaml.zst"),
            compress(CompressionFormat::Zstd, MODULES_YAML.as_bytes()),
        )
}
