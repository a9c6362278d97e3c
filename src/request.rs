//! Request serializer (component B): turns a method/URI/version/header-map
//! into request-line + header-block bytes appended to a [`Buffered`]'s write
//! buffer, and decides how the body (if any) will be framed.
//!
//! Host, Content-Length, Transfer-Encoding, and Cookie are owned entirely by
//! this module -- callers must not set them in the supplied header map.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, COOKIE, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, Uri, Version};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::header;
use crate::io::Buffered;
use crate::pool::ConnectionKind;
use crate::transport::Transport;

/// How the request body (if any) will be framed on the wire, decided here so
/// the body writer (component D) doesn't have to re-derive it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BodyLength {
    /// No body at all; `Content-Length: 0` may still have been sent.
    Empty,
    ContentLength(u64),
    Chunked,
}

const BODY_MANDATING: &[&str] = &["POST", "PUT", "PATCH"];

pub(crate) struct RequestParts<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub version: Version,
    pub headers: &'a HeaderMap<HeaderValue>,
    pub has_body: bool,
    pub kind: ConnectionKind,
    pub host_override: Option<&'a Bytes>,
    pub cookie_header: Option<&'a str>,
}

pub(crate) fn encode<T: Transport>(
    buf: &mut Buffered<T>,
    parts: &RequestParts<'_>,
    cfg: &Config,
) -> Result<BodyLength> {
    write_request_line(buf, parts.method, parts.uri, parts.version, parts.kind)?;

    let host = host_header_bytes(parts.uri, parts.host_override)?;
    buf.write_bytes(b"Host");
    buf.write_two_bytes(b':', b' ');
    buf.write_bytes(&host);
    buf.write_two_bytes(b'\r', b'\n');

    let body_length = if parts.has_body {
        set_length_for_request(parts.headers, parts.method, parts.version)?
    } else {
        BodyLength::Empty
    };

    match body_length {
        BodyLength::ContentLength(n) => {
            buf.write_bytes(b"Content-Length");
            buf.write_two_bytes(b':', b' ');
            buf.write_decimal(n);
            buf.write_two_bytes(b'\r', b'\n');
        }
        BodyLength::Chunked => {
            buf.write_bytes(b"Transfer-Encoding: chunked");
            buf.write_two_bytes(b'\r', b'\n');
        }
        BodyLength::Empty => {
            if !parts.has_body && is_body_mandating(parts.method) {
                buf.write_bytes(b"Content-Length: 0");
                buf.write_two_bytes(b'\r', b'\n');
            }
        }
    }

    write_other_headers(buf, parts.headers, cfg)?;

    if let Some(cookies) = parts.cookie_header {
        if !cookies.is_empty() {
            buf.write_bytes(b"Cookie");
            buf.write_two_bytes(b':', b' ');
            buf.write_ascii(cookies)?;
            buf.write_two_bytes(b'\r', b'\n');
        }
    }

    buf.write_two_bytes(b'\r', b'\n');
    Ok(body_length)
}

fn write_request_line<T: Transport>(
    buf: &mut Buffered<T>,
    method: &Method,
    uri: &Uri,
    version: Version,
    kind: ConnectionKind,
) -> Result<()> {
    buf.write_ascii(method.as_str())?;
    buf.write_byte(b' ');

    if *method == Method::CONNECT {
        let authority = uri
            .authority()
            .ok_or_else(|| Error::invalid_operation("CONNECT request target must be authority-form"))?;
        buf.write_ascii(authority.as_str())?;
    } else {
        match kind {
            ConnectionKind::Proxy => {
                buf.write_ascii(&uri.to_string())?;
            }
            ConnectionKind::Direct | ConnectionKind::Tunnel => {
                let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
                let target = if path_and_query.is_empty() { "/" } else { path_and_query };
                buf.write_ascii(target)?;
            }
        }
    }

    buf.write_byte(b' ');
    match version {
        Version::HTTP_10 => buf.write_bytes(b"HTTP/1.0"),
        _ => buf.write_bytes(b"HTTP/1.1"),
    }
    buf.write_two_bytes(b'\r', b'\n');
    Ok(())
}

fn host_header_bytes(uri: &Uri, override_bytes: Option<&Bytes>) -> Result<Vec<u8>> {
    if let Some(b) = override_bytes {
        return Ok(b.to_vec());
    }
    let authority = uri.authority().ok_or_else(Error::missing_host)?;
    let host = authority.host();

    let mut out = Vec::with_capacity(host.len() + 8);
    if host.contains(':') && !host.starts_with('[') {
        out.push(b'[');
        out.extend_from_slice(host.as_bytes());
        out.push(b']');
    } else {
        out.extend_from_slice(host.as_bytes());
    }

    if let Some(port) = authority.port_u16() {
        let default_port = match uri.scheme_str() {
            Some("https") => 443,
            _ => 80,
        };
        if port != default_port {
            out.push(b':');
            let mut ibuf = itoa::Buffer::new();
            out.extend_from_slice(ibuf.format(port).as_bytes());
        }
    }

    Ok(out)
}

fn set_length_for_request(
    headers: &HeaderMap<HeaderValue>,
    method: &Method,
    version: Version,
) -> Result<BodyLength> {
    if let Some(v) = headers.get(CONTENT_LENGTH) {
        let n = v
            .to_str()
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::invalid_operation("Content-Length header is not a valid length"))?;
        return Ok(BodyLength::ContentLength(n));
    }

    let can_chunk =
        version == Version::HTTP_11 && *method != Method::HEAD && *method != Method::GET && *method != Method::CONNECT;

    if can_chunk {
        Ok(BodyLength::Chunked)
    } else {
        Err(Error::invalid_operation(
            "request body requires Content-Length or HTTP/1.1 chunked framing",
        ))
    }
}

fn is_body_mandating(method: &Method) -> bool {
    BODY_MANDATING.iter().any(|m| *m == method.as_str())
}

fn write_other_headers<T: Transport>(
    buf: &mut Buffered<T>,
    headers: &HeaderMap<HeaderValue>,
    cfg: &Config,
) -> Result<()> {
    for name in headers.keys() {
        if *name == HOST || *name == CONTENT_LENGTH || *name == TRANSFER_ENCODING || *name == COOKIE {
            continue;
        }

        let descriptor = header::describe(name);
        let mut values = headers.get_all(name).iter();

        buf.write_bytes(name.as_str().as_bytes());
        buf.write_two_bytes(b':', b' ');
        if let Some(first) = values.next() {
            write_header_value(buf, first, cfg)?;
        }
        for v in values {
            buf.write_bytes(descriptor.separator.as_bytes());
            write_header_value(buf, v, cfg)?;
        }
        buf.write_two_bytes(b'\r', b'\n');
    }
    Ok(())
}

fn write_header_value<T: Transport>(buf: &mut Buffered<T>, v: &HeaderValue, cfg: &Config) -> Result<()> {
    let bytes = v.as_bytes();
    if bytes.iter().all(|&b| b < 0x80) {
        buf.write_bytes(bytes);
        Ok(())
    } else if let Some(encoder) = cfg.request_header_encoding_selector {
        let encoded = encoder(v).ok_or_else(Error::invalid_request_char)?;
        buf.write_bytes(&encoded);
        Ok(())
    } else {
        Err(Error::invalid_request_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{HeaderName, HeaderValue};

    fn buf() -> Buffered<tokio::io::DuplexStream> {
        let (_a, b) = tokio::io::duplex(4096);
        Buffered::new(b, 64)
    }

    fn drain(buf: &Buffered<tokio::io::DuplexStream>) -> String {
        String::from_utf8(buf.pending_write_bytes().to_vec()).unwrap_or_default()
    }

    #[test]
    fn origin_form_get_with_no_body() {
        let mut b = buf();
        let uri: Uri = "http://example.com/a/b?c=d".parse().unwrap();
        let headers = HeaderMap::new();
        let parts = RequestParts {
            method: &Method::GET,
            uri: &uri,
            version: Version::HTTP_11,
            headers: &headers,
            has_body: false,
            kind: ConnectionKind::Direct,
            host_override: None,
            cookie_header: None,
        };
        let cfg = Config::default();
        let body_len = encode(&mut b, &parts, &cfg).unwrap();
        assert_eq!(body_len, BodyLength::Empty);
        let wire = drain(&b);
        assert!(wire.starts_with("GET /a/b?c=d HTTP/1.1\r\n"));
        assert!(wire.contains("Host: example.com\r\n"));
    }

    #[test]
    fn connect_uses_authority_as_target() {
        let mut b = buf();
        let uri: Uri = "example.com:443".parse().unwrap();
        let headers = HeaderMap::new();
        let parts = RequestParts {
            method: &Method::CONNECT,
            uri: &uri,
            version: Version::HTTP_11,
            headers: &headers,
            has_body: false,
            kind: ConnectionKind::Direct,
            host_override: None,
            cookie_header: None,
        };
        let cfg = Config::default();
        encode(&mut b, &parts, &cfg).unwrap();
        let wire = drain(&b);
        assert!(wire.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
    }

    #[test]
    fn post_without_body_gets_content_length_zero() {
        let mut b = buf();
        let uri: Uri = "http://example.com/".parse().unwrap();
        let headers = HeaderMap::new();
        let parts = RequestParts {
            method: &Method::POST,
            uri: &uri,
            version: Version::HTTP_11,
            headers: &headers,
            has_body: false,
            kind: ConnectionKind::Direct,
            host_override: None,
            cookie_header: None,
        };
        let cfg = Config::default();
        encode(&mut b, &parts, &cfg).unwrap();
        assert!(drain(&b).contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn post_with_body_defaults_to_chunked() {
        let mut b = buf();
        let uri: Uri = "http://example.com/".parse().unwrap();
        let headers = HeaderMap::new();
        let parts = RequestParts {
            method: &Method::POST,
            uri: &uri,
            version: Version::HTTP_11,
            headers: &headers,
            has_body: true,
            kind: ConnectionKind::Direct,
            host_override: None,
            cookie_header: None,
        };
        let cfg = Config::default();
        let body_len = encode(&mut b, &parts, &cfg).unwrap();
        assert_eq!(body_len, BodyLength::Chunked);
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let uri: Uri = "http://[::1]:8080/".parse().unwrap();
        let host = host_header_bytes(&uri, None).unwrap();
        assert_eq!(host, b"[::1]:8080");
    }

    #[test]
    fn multi_value_header_joins_with_descriptor_separator() {
        let mut b = buf();
        let uri: Uri = "http://example.com/".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.append(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-cache"),
        );
        headers.append(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store"),
        );
        let parts = RequestParts {
            method: &Method::GET,
            uri: &uri,
            version: Version::HTTP_11,
            headers: &headers,
            has_body: false,
            kind: ConnectionKind::Direct,
            host_override: None,
            cookie_header: None,
        };
        let cfg = Config::default();
        encode(&mut b, &parts, &cfg).unwrap();
        let wire = drain(&b);
        assert!(wire.contains("no-cache, no-store"));
    }
}
