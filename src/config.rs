//! Connection-wide configuration knobs.
//!
//! Grouped the way `hyper::client::conn::http1::Builder` groups its h1
//! options: a plain struct of `Copy`/cloneable settings plus a couple of
//! caller-supplied function pointers for header (de)coding.

use std::time::Duration;

use http::HeaderValue;

/// The initial buffer size allocated before trying to read from IO.
pub(crate) const INIT_BUFFER_SIZE: usize = 4096;

/// Buffer size used by [`Config::stress_small_buffers`] to force boundary
/// conditions (splits, growths) during tests. Not a production setting.
pub(crate) const DEBUG_SMALL_BUFFER_SIZE: usize = 10;

/// Hard cap on a single chunk-size line, per RFC guidance against unbounded
/// chunk-extension abuse.
pub(crate) const CHUNK_LINE_MAX: usize = 16 * 1024;

/// Above this many bytes of declared or unknown request body, a non-2xx /
/// non-auth-challenge final response causes the Expect:100-continue gate to
/// refuse sending the body at all.
pub(crate) const EXPECT_100_ERROR_SEND_THRESHOLD: u64 = 1024;

/// Minimum legal length of a status line: `HTTP/1.1 200` is exactly 12 bytes.
pub(crate) const STATUS_LINE_MIN_LEN: usize = 12;

/// Encodes a single header's value to bytes for the wire. Returning `None`
/// falls back to strict ASCII-only encoding (non-ASCII bytes are rejected).
pub type HeaderEncoder = fn(&HeaderValue) -> Option<Vec<u8>>;

/// Decodes raw response header bytes into a displayable string. Defaults to
/// a Latin-1-ish passthrough, matching legacy server behavior for reason
/// phrases and header values that are not strict UTF-8.
pub type HeaderDecoder = fn(&[u8]) -> String;

#[derive(Clone)]
pub struct Config {
    /// Cap, in bytes, on the combined status-line + header bytes of a
    /// response (informational responses are not exempt).
    pub max_response_headers_length: usize,
    /// Cap, in bytes, on bytes drained from a response to salvage a
    /// connection for reuse after the caller didn't fully read the body.
    pub max_response_drain_size: usize,
    /// Maximum time to wait for a `100 Continue` before sending the request
    /// body anyway.
    pub expect_100_continue_timeout: Duration,
    /// Per-header outbound value encoder. `None` enforces ASCII-only values.
    pub request_header_encoding_selector: Option<HeaderEncoder>,
    /// Per-header inbound value decoder for non-strict-UTF8 header bytes.
    pub response_header_encoding_selector: Option<HeaderDecoder>,
    /// Whether a `Cookie` header should be synthesized from the configured
    /// cookie jar, and `Set-Cookie` responses captured into it.
    pub use_cookies: bool,
    pub(crate) initial_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            max_response_headers_length: 64 * 1024,
            max_response_drain_size: 1_000_000,
            expect_100_continue_timeout: Duration::from_secs(1),
            request_header_encoding_selector: None,
            response_header_encoding_selector: None,
            use_cookies: false,
            initial_buffer_size: INIT_BUFFER_SIZE,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn max_response_headers_length(mut self, bytes: usize) -> Self {
        self.max_response_headers_length = bytes;
        self
    }

    pub fn max_response_drain_size(mut self, bytes: usize) -> Self {
        self.max_response_drain_size = bytes;
        self
    }

    pub fn expect_100_continue_timeout(mut self, dur: Duration) -> Self {
        self.expect_100_continue_timeout = dur;
        self
    }

    pub fn request_header_encoding_selector(mut self, f: HeaderEncoder) -> Self {
        self.request_header_encoding_selector = Some(f);
        self
    }

    pub fn response_header_encoding_selector(mut self, f: HeaderDecoder) -> Self {
        self.response_header_encoding_selector = Some(f);
        self
    }

    pub fn use_cookies(mut self, enabled: bool) -> Self {
        self.use_cookies = enabled;
        self
    }

    /// Forces a tiny (10 byte) initial buffer so tests exercise buffer-growth
    /// and partial-read boundary conditions. Not meant for production use.
    pub fn stress_small_buffers(mut self) -> Self {
        self.initial_buffer_size = DEBUG_SMALL_BUFFER_SIZE;
        self
    }
}
