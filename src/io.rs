//! Framed buffered I/O (component A): owns the read and write byte buffers,
//! line-oriented reads with obsolete-folding tolerance, bounded scanning,
//! and append-then-flush writes.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::config::CHUNK_LINE_MAX;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// A region of the read buffer temporarily swapped out so a large
/// content-length body copy can read directly into a buffer sized for the
/// whole read, instead of bouncing through the small steady-state buffer.
/// Restored unconditionally -- see [`Buffered::read_large`].
struct SavedReadBuffer {
    buf: Vec<u8>,
    offset: usize,
    length: usize,
}

pub(crate) struct Buffered<T> {
    io: T,
    read_buf: Vec<u8>,
    read_offset: usize,
    read_length: usize,
    write_buf: Vec<u8>,
    initial_buf_size: usize,
}

impl<T: Transport> Buffered<T> {
    pub(crate) fn new(io: T, initial_buf_size: usize) -> Self {
        Buffered {
            io,
            read_buf: Vec::new(),
            read_offset: 0,
            read_length: 0,
            write_buf: Vec::new(),
            initial_buf_size,
        }
    }

    pub(crate) fn io_mut(&mut self) -> &mut T {
        &mut self.io
    }

    pub(crate) fn into_inner(self) -> T {
        self.io
    }

    /// The currently unread bytes, `[read_offset, read_length)`.
    pub(crate) fn unread(&self) -> &[u8] {
        &self.read_buf[self.read_offset..self.read_length]
    }

    pub(crate) fn has_unread(&self) -> bool {
        self.read_offset < self.read_length
    }

    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(self.read_offset + n <= self.read_length);
        self.read_offset += n;
    }

    /// `write_offset == 0` is part of the reuse-safety invariant (§8.3).
    pub(crate) fn write_pending(&self) -> usize {
        self.write_buf.len()
    }

    /// The bytes queued for the next [`Self::flush`], not yet on the wire.
    pub(crate) fn pending_write_bytes(&self) -> &[u8] {
        &self.write_buf
    }

    // ---- reads -----------------------------------------------------

    /// Appends more bytes, growing the buffer (doubling) if it's full.
    /// A zero-byte read is an error: the caller expected more data.
    pub(crate) async fn fill(&mut self) -> Result<usize> {
        match self.fill_raw().await? {
            0 => Err(Error::premature_eof(false)),
            n => Ok(n),
        }
    }

    /// Like [`Self::fill`] but a zero-byte result is returned, not an error
    /// -- it's the caller's job to decide whether EOF here is fatal.
    pub(crate) async fn initial_fill(&mut self) -> Result<usize> {
        self.fill_raw().await
    }

    async fn fill_raw(&mut self) -> Result<usize> {
        if self.read_offset > 0 {
            if self.read_offset < self.read_length {
                self.read_buf.copy_within(self.read_offset..self.read_length, 0);
            }
            self.read_length -= self.read_offset;
            self.read_offset = 0;
        }
        if self.read_buf.is_empty() {
            self.read_buf.resize(self.initial_buf_size, 0);
        } else if self.read_length == self.read_buf.len() {
            let new_cap = self.read_buf.len().saturating_mul(2);
            self.read_buf.resize(new_cap, 0);
        }
        let n = self
            .io
            .read(&mut self.read_buf[self.read_length..])
            .await
            .map_err(Error::io)?;
        self.read_length += n;
        Ok(n)
    }

    /// Scans for the next logical line: bytes up to (excluding) LF, with a
    /// trailing CR stripped. When `allow_folded` and a continuation line
    /// begins with SP/HT (RFC 7230 §3.2.4 obsolete folding), the fold is
    /// flattened to a single space and scanning continues for the next real
    /// line terminator. `max_bytes` bounds how much unread data may be
    /// scanned before giving up with `headers_too_large`/`chunk_too_large`.
    pub(crate) async fn read_line(
        &mut self,
        max_bytes: usize,
        allow_folded: bool,
        too_large: impl Fn() -> Error,
    ) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let scan_from = self.read_offset;
            if let Some(pos) = find_lf(&self.read_buf[scan_from..self.read_length]) {
                let lf_abs = scan_from + pos;
                let mut seg_end = lf_abs;
                if seg_end > self.read_offset && self.read_buf[seg_end - 1] == b'\r' {
                    seg_end -= 1;
                }
                out.extend_from_slice(&self.read_buf[self.read_offset..seg_end]);
                self.read_offset = lf_abs + 1;

                if allow_folded {
                    loop {
                        if self.read_offset < self.read_length {
                            break;
                        }
                        if self.fill_raw().await? == 0 {
                            break;
                        }
                    }
                    if self.read_offset < self.read_length
                        && matches!(self.read_buf[self.read_offset], b' ' | b'\t')
                    {
                        out.push(b' ');
                        continue;
                    }
                }
                return Ok(out);
            }

            if self.read_length - self.read_offset >= max_bytes {
                return Err(too_large());
            }
            if self.fill_raw().await? == 0 {
                return Err(Error::premature_eof(false));
            }
        }
    }

    pub(crate) async fn read_chunk_line(&mut self) -> Result<Vec<u8>> {
        self.read_line(CHUNK_LINE_MAX, false, Error::chunk_too_large).await
    }

    /// Copies up to `dst.len()` bytes, preferring buffered data; if the
    /// buffer is empty, reads directly from the transport. Returns the
    /// number of bytes copied (0 on EOF).
    pub(crate) async fn read_into(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.has_unread() {
            let n = std::cmp::min(dst.len(), self.read_length - self.read_offset);
            dst[..n].copy_from_slice(&self.read_buf[self.read_offset..self.read_offset + n]);
            self.read_offset += n;
            Ok(n)
        } else {
            let n = self.io.read(dst).await.map_err(Error::io)?;
            Ok(n)
        }
    }

    /// Reads a large, known-size span directly into `dst`, bypassing the
    /// steady-state buffer by temporarily swapping in one sized for the
    /// whole read. The original buffer is restored on every return path,
    /// including errors (§8 invariant 4 / §9 buffer-growth-vs-pooling note).
    pub(crate) async fn read_large(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.has_unread() || dst.len() <= self.read_buf.len().max(self.initial_buf_size) {
            return self.read_into(dst).await;
        }

        let saved = SavedReadBuffer {
            buf: std::mem::replace(&mut self.read_buf, vec![0; dst.len()]),
            offset: self.read_offset,
            length: self.read_length,
        };
        self.read_offset = 0;
        self.read_length = 0;

        let result = self.io.read(&mut self.read_buf[..dst.len()]).await;

        // Unconditional restore: runs whether the read above succeeded or not.
        let scratch = std::mem::replace(&mut self.read_buf, saved.buf);
        self.read_offset = saved.offset;
        self.read_length = saved.length;

        let n = result.map_err(Error::io)?;
        dst[..n].copy_from_slice(&scratch[..n]);
        Ok(n)
    }

    // ---- writes ------------------------------------------------------

    pub(crate) fn write_byte(&mut self, b: u8) {
        self.write_buf.push(b);
    }

    pub(crate) fn write_two_bytes(&mut self, b1: u8, b2: u8) {
        self.write_buf.push(b1);
        self.write_buf.push(b2);
    }

    pub(crate) fn write_bytes(&mut self, bs: &[u8]) {
        self.write_buf.extend_from_slice(bs);
    }

    /// Rejects any byte with the high bit set: request-line and header
    /// fields are ASCII unless the caller supplied an explicit encoder.
    pub(crate) fn write_ascii(&mut self, s: &str) -> Result<()> {
        if s.bytes().any(|b| b >= 0x80) {
            return Err(Error::invalid_request_char());
        }
        self.write_buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    pub(crate) fn write_decimal(&mut self, v: u64) {
        let mut buf = itoa::Buffer::new();
        self.write_buf.extend_from_slice(buf.format(v).as_bytes());
    }

    pub(crate) fn write_hex(&mut self, v: u64) {
        use std::io::Write;
        let _ = write!(&mut self.write_buf, "{:x}", v);
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.io.write_all(&self.write_buf).await.map_err(Error::io)?;
            self.write_buf.clear();
        }
        self.io.flush().await.map_err(Error::io)
    }
}

fn find_lf(haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn fill_grows_buffer_when_full() {
        let (mut client, server_io) = duplex(64);
        let mut buffered = Buffered::new(server_io, 4);
        client.write_all(b"abcdefgh").await.unwrap();
        let n1 = buffered.fill().await.unwrap();
        assert_eq!(n1, 4);
        let n2 = buffered.fill().await.unwrap();
        assert!(n2 > 0);
        assert_eq!(buffered.unread(), b"abcdefgh");

        async fn write_all(c: &mut tokio::io::DuplexStream, b: &[u8]) {
            use tokio::io::AsyncWriteExt;
            c.write_all(b).await.unwrap();
        }
        let _ = write_all; // silence unused helper warning in case of trimming
        let _ = client;
    }

    #[tokio::test]
    async fn read_line_strips_crlf() {
        let (mut client, server_io) = duplex(64);
        client.write_all(b"hello\r\nworld").await.unwrap();
        let mut buffered = Buffered::new(server_io, 16);
        let line = buffered.read_line(1024, true, Error::headers_too_large).await.unwrap();
        assert_eq!(line, b"hello");
    }

    #[tokio::test]
    async fn read_line_flattens_obsolete_folding() {
        let (mut client, server_io) = duplex(128);
        client.write_all(b"a\r\n bc\r\n\r\n").await.unwrap();
        let mut buffered = Buffered::new(server_io, 16);
        let line = buffered.read_line(1024, true, Error::headers_too_large).await.unwrap();
        assert_eq!(line, b"a bc");
    }

    #[tokio::test]
    async fn read_line_too_large() {
        let (mut client, server_io) = duplex(256);
        client.write_all(&vec![b'a'; 100]).await.unwrap();
        let mut buffered = Buffered::new(server_io, 16);
        let err = buffered
            .read_line(32, false, Error::headers_too_large)
            .await
            .unwrap_err();
        assert!(err.is_too_large());
    }

    #[tokio::test]
    async fn write_then_flush_round_trips() {
        let (mut client, server_io) = duplex(64);
        let mut buffered = Buffered::new(server_io, 16);
        buffered.write_bytes(b"GET / HTTP/1.1\r\n");
        buffered.write_decimal(42);
        buffered.flush().await.unwrap();
        let mut got = [0u8; 32];
        let n = client.read(&mut got).await.unwrap();
        assert_eq!(&got[..n], b"GET / HTTP/1.1\r\n42");
    }

    #[tokio::test]
    async fn write_ascii_rejects_high_bit() {
        let (_client, server_io) = duplex(64);
        let mut buffered = Buffered::new(server_io, 16);
        let err = buffered.write_ascii("h\u{e9}llo").unwrap_err();
        assert!(!err.is_retryable());
    }
}
