//! Error and Result types for the connection core.
//!
//! Mirrors the shape of `hyper::Error`: an opaque struct wrapping a private
//! `Kind`, with an optional boxed cause, rather than a public enum. Callers
//! query behavior (`is_retryable`, `is_cancelled`, ...) instead of matching
//! on variants.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

/// An error encountered while driving an HTTP/1.x connection.
pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// Transport closed mid-exchange.
    PrematureEof { started_sending_body: bool },
    InvalidStatusLine,
    InvalidStatusCode,
    InvalidStatusReason,
    InvalidHeaderName,
    InvalidHeaderLine,
    InvalidHeaderFolding,
    HeadersTooLarge,
    ChunkTooLarge,
    InvalidRequestChar,
    MissingHost,
    Io,
    Cancelled,
    AuthConnectionFailure,
    /// Programmer error: an operation was invoked in a state that forbids it.
    InvalidOperation(&'static str),
}

impl Error {
    /// True if no byte of the request body had reached the transport, so the
    /// caller may safely retry the whole request on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::PrematureEof {
                started_sending_body: false
            }
        )
    }

    /// True if this error represents a cancellation rather than a protocol
    /// or I/O failure. Cancellation outranks a raw I/O error produced by a
    /// torn-down transport.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.kind, Kind::Cancelled)
    }

    /// True if the connection closed before a message could complete.
    pub fn is_incomplete_message(&self) -> bool {
        matches!(self.inner.kind, Kind::PrematureEof { .. })
    }

    /// True if this was a parse error (status line, headers, or chunk framing).
    pub fn is_parse(&self) -> bool {
        matches!(
            self.inner.kind,
            Kind::InvalidStatusLine
                | Kind::InvalidStatusCode
                | Kind::InvalidStatusReason
                | Kind::InvalidHeaderName
                | Kind::InvalidHeaderLine
                | Kind::InvalidHeaderFolding
                | Kind::HeadersTooLarge
                | Kind::ChunkTooLarge
        )
    }

    /// True if this was caused by exceeding a configured size cap.
    pub fn is_too_large(&self) -> bool {
        matches!(self.inner.kind, Kind::HeadersTooLarge | Kind::ChunkTooLarge)
    }

    /// True if the underlying transport I/O failed with a timeout, rather
    /// than this crate's own `Kind` variants (the Expect:100-continue wait
    /// and liveness scavenge both resolve through a timer without ever
    /// producing an error, so this can only come from the transport).
    pub fn is_timeout(&self) -> bool {
        matches!(self.inner.kind, Kind::Io)
            && StdError::source(self)
                .and_then(|c| c.downcast_ref::<io::Error>())
                .map(|e| e.kind() == io::ErrorKind::TimedOut)
                .unwrap_or(false)
    }

    pub(crate) fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(ErrorImpl { kind, cause: None }),
        }
    }

    pub(crate) fn with<C: Into<Cause>>(mut self, cause: C) -> Error {
        self.inner.cause = Some(cause.into());
        self
    }

    pub(crate) fn io(err: io::Error) -> Error {
        Error::new(Kind::Io).with(err)
    }

    pub(crate) fn premature_eof(started_sending_body: bool) -> Error {
        Error::new(Kind::PrematureEof {
            started_sending_body,
        })
    }

    pub(crate) fn cancelled() -> Error {
        Error::new(Kind::Cancelled)
    }

    /// Rewrites a `PrematureEof` to reflect that request body bytes had
    /// already reached the transport, so it's no longer safely retryable.
    /// No-op for any other kind.
    pub(crate) fn mark_body_started(mut self) -> Error {
        if let Kind::PrematureEof { started_sending_body } = &mut self.inner.kind {
            *started_sending_body = true;
        }
        self
    }

    pub(crate) fn kind(&self) -> &Kind {
        &self.inner.kind
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut b = f.debug_struct("h1conn::Error");
        b.field("kind", &self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            b.field("cause", cause);
        }
        b.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::PrematureEof { .. } => f.write_str("connection closed before message completed"),
            Kind::InvalidStatusLine => f.write_str("invalid HTTP status line"),
            Kind::InvalidStatusCode => f.write_str("invalid HTTP status code"),
            Kind::InvalidStatusReason => f.write_str("invalid HTTP status reason phrase"),
            Kind::InvalidHeaderName => f.write_str("invalid header name"),
            Kind::InvalidHeaderLine => f.write_str("invalid header line"),
            Kind::InvalidHeaderFolding => f.write_str("invalid obsolete header folding"),
            Kind::HeadersTooLarge => f.write_str("message headers exceeded configured limit"),
            Kind::ChunkTooLarge => f.write_str("chunk size line exceeded limit"),
            Kind::InvalidRequestChar => f.write_str("invalid non-ASCII byte in request header"),
            Kind::MissingHost => f.write_str("CONNECT request is missing a Host header"),
            Kind::Io => f.write_str("connection I/O error"),
            Kind::Cancelled => f.write_str("operation was cancelled"),
            Kind::AuthConnectionFailure => {
                f.write_str("failed to drain connection during authentication handshake")
            }
            Kind::InvalidOperation(msg) => write!(f, "invalid operation: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.cause.as_ref().map(|c| &**c as &(dyn StdError + 'static))
    }
}

macro_rules! kind_ctor {
    ($name:ident, $variant:ident) => {
        impl Error {
            pub(crate) fn $name() -> Error {
                Error::new(Kind::$variant)
            }
        }
    };
}

kind_ctor!(invalid_status_line, InvalidStatusLine);
kind_ctor!(invalid_status_code, InvalidStatusCode);
kind_ctor!(invalid_status_reason, InvalidStatusReason);
kind_ctor!(invalid_header_name, InvalidHeaderName);
kind_ctor!(invalid_header_line, InvalidHeaderLine);
kind_ctor!(invalid_header_folding, InvalidHeaderFolding);
kind_ctor!(headers_too_large, HeadersTooLarge);
kind_ctor!(chunk_too_large, ChunkTooLarge);
kind_ctor!(invalid_request_char, InvalidRequestChar);
kind_ctor!(missing_host, MissingHost);
kind_ctor!(auth_connection_failure, AuthConnectionFailure);

impl Error {
    pub(crate) fn invalid_operation(msg: &'static str) -> Error {
        Error::new(Kind::InvalidOperation(msg))
    }
}
