//! Response parser (component C): reads a status line + header block off a
//! [`Buffered`], classifies the body framing, and walks the informational
//! (1xx) loop. Grounded on `Client`'s `Http1Transaction` impl in hyper's
//! `proto/h1/role.rs` -- same head shape, same body-length decision table.

use std::borrow::Cow;

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};

use crate::config::{Config, STATUS_LINE_MIN_LEN};
use crate::error::{Error, Result};
use crate::header;
use crate::io::Buffered;
use crate::transport::Transport;

const MAX_HEADERS: usize = 100;

pub(crate) struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub reason: Cow<'static, str>,
    pub headers: HeaderMap<HeaderValue>,
}

/// How the response body is framed, decided per RFC 7230 §3.3.3's ordering:
/// informational/204/304/HEAD have none; `Transfer-Encoding: chunked` wins
/// over `Content-Length`; otherwise a declared length; otherwise read to EOF.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DecodedLength {
    Empty,
    ContentLength(u64),
    Chunked,
    /// A 2xx response to CONNECT, or the 101 Switching Protocols response:
    /// everything after the head is raw tunneled bytes, not an HTTP body.
    RawTunnel,
    UntilClose,
}

/// Parses response heads until a terminal (non-1xx, or 101) one is found.
/// Each informational response is reported through `on_informational` before
/// the loop reads the next one -- callers use this to release an
/// Expect:100-continue gate on a literal `100`.
pub(crate) async fn parse_response<T: Transport>(
    buf: &mut Buffered<T>,
    cfg: &Config,
    mut on_informational: impl FnMut(StatusCode),
) -> Result<ResponseHead> {
    loop {
        let head = read_one_head(buf, cfg).await?;
        if head.status.as_u16() == 101 {
            return Ok(head);
        }
        if head.status.is_informational() {
            on_informational(head.status);
            continue;
        }
        return Ok(head);
    }
}

/// Reads exactly one status-line + header block and returns it whether it's
/// informational or terminal, without looping past it the way
/// [`parse_response`] does. The Expect:100-continue gate needs this: it has
/// to react the instant a single `100 Continue` (or an out-of-order final
/// response) shows up, rather than wait for the informational loop to run
/// to a terminal status that may never come until the request body is sent.
pub(crate) async fn read_one_head<T: Transport>(buf: &mut Buffered<T>, cfg: &Config) -> Result<ResponseHead> {
    let raw = read_head(buf, cfg.max_response_headers_length).await?;
    parse_head_bytes(&raw, cfg)
}

/// Classifies how the body following `head` is framed, given the request
/// method that produced it (a response body's shape can't be known without
/// knowing what was asked for -- HEAD and CONNECT are both silent on it).
pub(crate) fn decoded_length(head: &ResponseHead, method: &Method) -> Result<DecodedLength> {
    if head.status.as_u16() == 101 {
        return Ok(DecodedLength::RawTunnel);
    }
    if head.status.is_informational() {
        return Ok(DecodedLength::Empty);
    }
    match head.status.as_u16() {
        204 | 304 => return Ok(DecodedLength::Empty),
        _ => {}
    }
    if *method == Method::HEAD {
        return Ok(DecodedLength::Empty);
    }
    if *method == Method::CONNECT && head.status.is_success() {
        return Ok(DecodedLength::RawTunnel);
    }

    if let Some(te) = head.headers.get(http::header::TRANSFER_ENCODING) {
        if head.version == Version::HTTP_10 {
            return Err(Error::invalid_header_line());
        }
        let is_chunked = te
            .to_str()
            .map(|s| {
                s.rsplit(',')
                    .next()
                    .map(|last| last.trim().eq_ignore_ascii_case("chunked"))
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        return Ok(if is_chunked {
            DecodedLength::Chunked
        } else {
            DecodedLength::UntilClose
        });
    }

    let mut lengths = head.headers.get_all(http::header::CONTENT_LENGTH).iter();
    if let Some(first) = lengths.next() {
        let n: u64 = first
            .to_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(Error::invalid_header_line)?;
        for other in lengths {
            if other.to_str().ok().and_then(|s| s.parse::<u64>().ok()) != Some(n) {
                return Err(Error::invalid_header_line());
            }
        }
        return Ok(DecodedLength::ContentLength(n));
    }

    Ok(DecodedLength::UntilClose)
}

/// Reads status-line + header lines one at a time through
/// [`Buffered::read_line`] (so obsolete folding gets flattened on the way
/// in, per RFC 7230 §3.2.4) and reassembles them into a single CRLF-framed
/// block ending at the blank terminator line, ready for `httparse` -- which
/// by this point never sees a folded continuation to choke on.
async fn read_head<T: Transport>(buf: &mut Buffered<T>, max_len: usize) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    loop {
        let line = buf.read_line(max_len, true, Error::headers_too_large).await?;
        let is_terminator = line.is_empty();
        raw.extend_from_slice(&line);
        raw.extend_from_slice(b"\r\n");
        if raw.len() > max_len {
            return Err(Error::headers_too_large());
        }
        if is_terminator {
            return Ok(raw);
        }
    }
}

fn parse_head_bytes(raw: &[u8], cfg: &Config) -> Result<ResponseHead> {
    check_status_line_prefix(raw)?;

    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut header_storage);
    let parsed_len = match response.parse(raw).map_err(|_| Error::invalid_header_line())? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Err(Error::invalid_status_line()),
    };
    let _ = parsed_len;

    let code = response.code.ok_or_else(Error::invalid_status_code)?;
    let status = StatusCode::from_u16(code).map_err(|_| Error::invalid_status_code())?;

    let raw_reason = response.reason.ok_or_else(Error::invalid_status_reason)?;
    let reason = match status.canonical_reason() {
        Some(canonical) if canonical == raw_reason => Cow::Borrowed(canonical),
        _ => match std::str::from_utf8(raw_reason.as_bytes()) {
            Ok(s) => Cow::Owned(s.to_owned()),
            Err(_) => match cfg.response_header_encoding_selector {
                Some(decode) => Cow::Owned(decode(raw_reason.as_bytes())),
                None => return Err(Error::invalid_status_reason()),
            },
        },
    };

    let version = match response.version {
        Some(1) => Version::HTTP_11,
        Some(0) => Version::HTTP_10,
        _ => return Err(Error::invalid_status_line()),
    };

    let mut headers = HeaderMap::with_capacity(response.headers.len());
    for h in response.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes()).map_err(|_| Error::invalid_header_name())?;
        let value = HeaderValue::from_bytes(h.value).map_err(|_| Error::invalid_header_line())?;
        headers.append(name, value);
    }

    Ok(ResponseHead {
        version,
        status,
        reason,
        headers,
    })
}

/// RFC 7230 §3.1.2 status-line prefix check, done as a literal byte-string
/// comparison (not a native-endian integer cast over the first 8 bytes,
/// which is endianness-dependent and not worth the risk here).
fn check_status_line_prefix(raw: &[u8]) -> Result<()> {
    if raw.len() < STATUS_LINE_MIN_LEN {
        return Err(Error::invalid_status_line());
    }
    let prefix = &raw[0..8];
    if prefix != b"HTTP/1.1" && prefix != b"HTTP/1.0" {
        return Err(Error::invalid_status_line());
    }
    if raw[8] != b' ' {
        return Err(Error::invalid_status_line());
    }
    Ok(())
}

/// Filters a header for inclusion in a chunked trailer block (RFC 7230
/// §4.1.2): framing and a handful of other headers may never appear there.
pub(crate) fn allowed_in_trailer(name: &HeaderName) -> bool {
    !header::describe(name).non_trailing
}
