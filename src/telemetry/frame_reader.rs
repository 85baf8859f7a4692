//! Forward-only buffered window over a byte source.
//!
//! Both log formats need to look at a few header bytes before deciding how
//! much to consume, and to step forward a single byte when re-synchronising
//! after corruption. `FrameReader` keeps just enough of the stream in memory
//! to do that.

use std::io::{self, Read};

const READ_CHUNK: usize = 64 * 1024;

pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    consumed: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(READ_CHUNK),
            pos: 0,
            eof: false,
            consumed: 0,
        }
    }

    /// Number of buffered, unconsumed bytes.
    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Make at least `n` bytes available. Returns `false` if the stream ends
    /// first; whatever was buffered stays readable.
    pub fn fill(&mut self, n: usize) -> io::Result<bool> {
        while self.available() < n {
            if self.eof {
                return Ok(false);
            }
            if self.pos > 0 && self.pos >= self.buf.len() / 2 {
                self.buf.drain(..self.pos);
                self.pos = 0;
            }
            let start = self.buf.len();
            self.buf.resize(start + READ_CHUNK.max(n), 0);
            let read = loop {
                match self.inner.read(&mut self.buf[start..]) {
                    Ok(read) => break read,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.buf.truncate(start);
                        return Err(e);
                    }
                }
            };
            self.buf.truncate(start + read);
            if read == 0 {
                self.eof = true;
            }
        }
        Ok(true)
    }

    /// Up to `n` buffered bytes, without consuming them.
    pub fn peek(&self, n: usize) -> &[u8] {
        let end = (self.pos + n).min(self.buf.len());
        &self.buf[self.pos..end]
    }

    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.available());
        self.pos += n;
        self.consumed += n as u64;
    }

    /// Total bytes consumed since construction.
    pub fn offset(&self) -> u64 {
        self.consumed
    }
}
