//! Body readers and writers (component D).
//!
//! The chunked reader is a state machine in the same spirit as hyper's
//! `ChunkedState` in `proto/h1/decode.rs`, but built on top of this crate's
//! own line-oriented buffered reads (`Buffered::read_line`) instead of a
//! byte-at-a-time poll loop -- the CRLF/extension/trailer scanning that
//! `ChunkedState` does one byte at a time is exactly what `read_line` already
//! does for us.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::CHUNK_LINE_MAX;
use crate::error::{Error, Result};
use crate::io::Buffered;
use crate::parse::{allowed_in_trailer, DecodedLength};
use crate::request::BodyLength;
use crate::transport::Transport;

// ---- reading ------------------------------------------------------------

pub(crate) enum BodyReader {
    Empty,
    ContentLength { remaining: u64 },
    Chunked(ChunkedReader),
    UntilClose { eof: bool },
    /// A successful CONNECT, or a 101 response: everything after the head is
    /// opaque tunneled bytes, not framed as an HTTP body at all.
    RawTunnel,
}

impl BodyReader {
    pub(crate) fn new(len: DecodedLength) -> BodyReader {
        match len {
            DecodedLength::Empty => BodyReader::Empty,
            DecodedLength::ContentLength(0) => BodyReader::ContentLength { remaining: 0 },
            DecodedLength::ContentLength(n) => BodyReader::ContentLength { remaining: n },
            DecodedLength::Chunked => BodyReader::Chunked(ChunkedReader::new()),
            DecodedLength::UntilClose => BodyReader::UntilClose { eof: false },
            DecodedLength::RawTunnel => BodyReader::RawTunnel,
        }
    }

    pub(crate) fn is_eof(&self) -> bool {
        match self {
            BodyReader::Empty => true,
            BodyReader::ContentLength { remaining } => *remaining == 0,
            BodyReader::Chunked(c) => c.state == ChunkedReadState::Done,
            BodyReader::UntilClose { eof } => *eof,
            BodyReader::RawTunnel => false,
        }
    }

    /// An EOF-delimited body (declared or not) can never be followed by
    /// another message on the same connection.
    pub(crate) fn forces_connection_close(&self) -> bool {
        matches!(self, BodyReader::UntilClose { .. } | BodyReader::RawTunnel)
    }

    pub(crate) async fn read<T: Transport>(&mut self, buf: &mut Buffered<T>, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        match self {
            BodyReader::Empty => Ok(0),
            BodyReader::ContentLength { remaining } => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let want = std::cmp::min(dst.len() as u64, *remaining) as usize;
                let n = buf.read_large(&mut dst[..want]).await?;
                if n == 0 {
                    return Err(Error::premature_eof(true));
                }
                *remaining -= n as u64;
                Ok(n)
            }
            BodyReader::UntilClose { eof } => {
                if *eof {
                    return Ok(0);
                }
                let n = buf.read_into(dst).await?;
                if n == 0 {
                    *eof = true;
                }
                Ok(n)
            }
            BodyReader::RawTunnel => buf.read_into(dst).await,
            BodyReader::Chunked(c) => c.read(buf, dst).await,
        }
    }

    /// Trailers captured after the terminal chunk, if any and if this is a
    /// chunked body. Only meaningful once [`Self::is_eof`] is true.
    pub(crate) fn take_trailers(&mut self) -> Option<HeaderMap> {
        match self {
            BodyReader::Chunked(c) => c.trailers.take(),
            _ => None,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
enum ChunkedReadState {
    Head,
    Body,
    TrailerLine,
    Done,
}

pub(crate) struct ChunkedReader {
    state: ChunkedReadState,
    chunk_remaining: u64,
    trailers: Option<HeaderMap>,
}

impl ChunkedReader {
    fn new() -> ChunkedReader {
        ChunkedReader {
            state: ChunkedReadState::Head,
            chunk_remaining: 0,
            trailers: None,
        }
    }

    async fn read<T: Transport>(&mut self, buf: &mut Buffered<T>, dst: &mut [u8]) -> Result<usize> {
        loop {
            match self.state {
                ChunkedReadState::Head => {
                    let line = buf.read_chunk_line().await?;
                    let size = parse_chunk_size(&line)?;
                    if size == 0 {
                        self.state = ChunkedReadState::TrailerLine;
                    } else {
                        self.chunk_remaining = size;
                        self.state = ChunkedReadState::Body;
                    }
                }
                ChunkedReadState::Body => {
                    if self.chunk_remaining == 0 {
                        expect_crlf(buf).await?;
                        self.state = ChunkedReadState::Head;
                        continue;
                    }
                    let want = std::cmp::min(dst.len() as u64, self.chunk_remaining) as usize;
                    let n = buf.read_into(&mut dst[..want]).await?;
                    if n == 0 {
                        return Err(Error::premature_eof(true));
                    }
                    self.chunk_remaining -= n as u64;
                    return Ok(n);
                }
                ChunkedReadState::TrailerLine => {
                    let line = buf
                        .read_line(CHUNK_LINE_MAX, true, Error::headers_too_large)
                        .await?;
                    if line.is_empty() {
                        self.state = ChunkedReadState::Done;
                        return Ok(0);
                    }
                    let (name, value) = split_header_line(&line)?;
                    if allowed_in_trailer(&name) {
                        self.trailers.get_or_insert_with(HeaderMap::new).append(name, value);
                    }
                }
                ChunkedReadState::Done => return Ok(0),
            }
        }
    }
}

async fn expect_crlf<T: Transport>(buf: &mut Buffered<T>) -> Result<()> {
    let mut pair = [0u8; 2];
    let mut got = 0;
    while got < 2 {
        let n = buf.read_into(&mut pair[got..]).await?;
        if n == 0 {
            return Err(Error::premature_eof(true));
        }
        got += n;
    }
    if &pair != b"\r\n" {
        return Err(Error::invalid_header_line());
    }
    Ok(())
}

fn parse_chunk_size(line: &[u8]) -> Result<u64> {
    let size_part = match line.iter().position(|&b| b == b';') {
        Some(pos) => &line[..pos],
        None => line,
    };
    let trimmed = trim_ascii_whitespace(size_part);
    if trimmed.is_empty() {
        return Err(Error::invalid_header_line());
    }
    let mut value: u64 = 0;
    for &b in trimmed {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(Error::invalid_header_line()),
        } as u64;
        value = value
            .checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(Error::chunk_too_large)?;
    }
    Ok(value)
}

fn split_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue)> {
    let colon = line.iter().position(|&b| b == b':').ok_or_else(Error::invalid_header_line)?;
    let name =
        HeaderName::from_bytes(trim_ascii_whitespace(&line[..colon])).map_err(|_| Error::invalid_header_name())?;
    let value = HeaderValue::from_bytes(trim_ascii_whitespace(&line[colon + 1..]))
        .map_err(|_| Error::invalid_header_line())?;
    Ok((name, value))
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ' && b != b'\t').unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|&b| b != b' ' && b != b'\t').map(|p| p + 1).unwrap_or(start);
    &bytes[start..end]
}

/// Reads and discards the remainder of a response body so the connection can
/// be reused, up to `max_bytes`. Returns `true` if the body was fully
/// consumed within budget, `false` if the cap was hit first (the caller
/// should then close the connection instead of pooling it).
pub(crate) async fn drain<T: Transport>(reader: &mut BodyReader, buf: &mut Buffered<T>, max_bytes: usize) -> Result<bool> {
    let mut scratch = [0u8; 8 * 1024];
    let mut drained = 0usize;
    loop {
        if reader.is_eof() {
            return Ok(true);
        }
        if drained >= max_bytes {
            return Ok(false);
        }
        let want = std::cmp::min(scratch.len(), max_bytes - drained);
        let n = reader.read(buf, &mut scratch[..want]).await?;
        if n == 0 {
            return Ok(true);
        }
        drained += n;
    }
}

// ---- writing --------------------------------------------------------------

pub(crate) enum BodyWriter {
    Empty,
    ContentLength { remaining: u64 },
    Chunked,
}

impl BodyWriter {
    pub(crate) fn new(len: BodyLength) -> BodyWriter {
        match len {
            BodyLength::Empty => BodyWriter::Empty,
            BodyLength::ContentLength(n) => BodyWriter::ContentLength { remaining: n },
            BodyLength::Chunked => BodyWriter::Chunked,
        }
    }

    pub(crate) fn write<T: Transport>(&mut self, buf: &mut Buffered<T>, data: &[u8]) -> Result<()> {
        match self {
            BodyWriter::Empty => {
                if data.is_empty() {
                    Ok(())
                } else {
                    Err(Error::invalid_operation("cannot write a body for a bodyless request"))
                }
            }
            BodyWriter::ContentLength { remaining } => {
                if data.len() as u64 > *remaining {
                    return Err(Error::invalid_operation(
                        "wrote more bytes than the declared Content-Length",
                    ));
                }
                buf.write_bytes(data);
                *remaining -= data.len() as u64;
                Ok(())
            }
            BodyWriter::Chunked => {
                if data.is_empty() {
                    return Ok(());
                }
                buf.write_hex(data.len() as u64);
                buf.write_two_bytes(b'\r', b'\n');
                buf.write_bytes(data);
                buf.write_two_bytes(b'\r', b'\n');
                Ok(())
            }
        }
    }

    pub(crate) fn finish<T: Transport>(&mut self, buf: &mut Buffered<T>) -> Result<()> {
        match self {
            BodyWriter::Empty => Ok(()),
            BodyWriter::ContentLength { remaining } => {
                if *remaining != 0 {
                    Err(Error::invalid_operation(
                        "request body was shorter than the declared Content-Length",
                    ))
                } else {
                    Ok(())
                }
            }
            BodyWriter::Chunked => {
                buf.write_bytes(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}
