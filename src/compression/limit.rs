// src/compression/limit.rs

//! Byte ceiling for decompressed streams

use std::io::{self, Read};

/// Reader that stops after `limit` bytes
///
/// Once the ceiling is hit the reader returns end-of-stream. Errors from the
/// inner reader pass through.
#[derive(Debug)]
pub struct Bounded<R> {
    inner: R,
    limit: u64,
    consumed: u64,
    /// Set once end-of-stream was reported at the ceiling, `Some(true)` when
    /// the inner reader still had data
    cut: Option<bool>,
}

impl<R> Bounded<R> {
    /// Cap `inner` at `limit` bytes
    pub fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            consumed: 0,
            cut: None,
        }
    }

    /// Bytes handed out so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// True once a read was refused because input remained past `limit`
    ///
    /// A stream exactly `limit` bytes long is not cut. Decoders use this to
    /// tell a cut-off document from a malformed one.
    pub fn ceiling_reached(&self) -> bool {
        self.cut == Some(true)
    }
}

impl<R: Read> Bounded<R> {
    /// Look one byte past the ceiling to see whether anything was dropped
    fn check_cut(&mut self) -> bool {
        if let Some(cut) = self.cut {
            return cut;
        }
        let mut byte = [0u8; 1];
        let cut = loop {
            match self.inner.read(&mut byte) {
                Ok(n) => break n > 0,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Whatever follows is unreadable, but it is past the ceiling
                Err(_) => break true,
            }
        };
        self.cut = Some(cut);
        cut
    }
}

impl<R: Read> Read for Bounded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.limit.saturating_sub(self.consumed);
        if remaining == 0 {
            self.check_cut();
            return Ok(0);
        }

        let max = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let n = self.inner.read(&mut buf[..max])?;
        self.consumed += n as u64;
        Ok(n)
    }
}
