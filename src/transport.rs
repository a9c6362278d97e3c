//! Trait seam for the byte-oriented transport (TCP, TLS, a CONNECT tunnel,
//! ...). TLS, DNS, and proxy handshakes all happen before a transport
//! reaches this crate; this module only describes what the connection core
//! needs from it.

use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite};

/// Everything the connection core needs from the underlying byte stream.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Optional capability: a zero-timeout readability probe used only to
/// fast-path the liveness check in [`crate::readahead`] on transports
/// (typically real sockets) that can answer it without issuing a read.
///
/// Transports that can't answer cheaply simply don't implement this; the
/// liveness check then falls back to issuing a real buffered read.
pub trait PollReadable {
    /// Returns `Ready(true)` if the transport has bytes (or EOF) available
    /// right now without blocking, `Ready(false)` if it's idle, and
    /// `Pending` if readiness can't be determined synchronously.
    fn poll_readable_now(&mut self, cx: &mut Context<'_>) -> Poll<bool>;
}
