//! Trait seam standing in for the external connection pool described in the
//! design: this crate only ever calls `invalidate`, `notify_idle` (the
//! `return_connection` signal), `settings`, `host_header_bytes`, and `kind`
//! on it. Everything else about pooling -- creation, scavenging loops,
//! idle-list bookkeeping -- lives outside this crate.

use std::time::Duration;

use bytes::Bytes;

use crate::error::Error;

/// How this connection's target was reached, which affects request-line
/// target-form selection (origin-form vs. absolute-form vs. raw CONNECT
/// authority).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Directly connected to the origin server.
    Direct,
    /// Connected through a forward proxy; requests must use absolute-form
    /// request targets.
    Proxy,
    /// An HTTP CONNECT tunnel has already been established; this connection
    /// now carries opaque bytes to the tunneled endpoint.
    Tunnel,
}

/// The subset of pool-wide configuration this core reads at acquire time.
#[derive(Clone, Copy, Debug)]
pub struct PoolSettings {
    pub max_response_headers_length: usize,
    pub max_response_drain_size: usize,
    pub expect_100_continue_timeout: Duration,
}

/// Callback surface a [`crate::conn::Connection`] uses to cooperate with its
/// owning pool. The pool itself is out of scope for this crate; it is
/// modeled purely as this trait so the connection core can be driven and
/// tested without one.
pub trait PoolHandle: Send + Sync + std::fmt::Debug {
    /// Pool-wide caps and timeouts, consulted once at connection
    /// construction time and mergeable into the connection's own
    /// [`crate::config::Config`].
    fn settings(&self) -> PoolSettings;

    /// Host header bytes the pool wants used verbatim (e.g. because it
    /// already normalized the authority), if any.
    fn host_header_bytes(&self) -> Option<Bytes>;

    /// How this connection reaches its target.
    fn kind(&self) -> ConnectionKind;

    /// The connection has become permanently unusable; the pool must not
    /// hand it out again and should drop its reference.
    fn invalidate(&self, reason: &Error);

    /// The connection has finished a response, is not `connection_close`,
    /// and is ready to be returned to the idle list.
    fn notify_idle(&self);
}

/// A [`PoolHandle`] for a connection with no pool at all (e.g. a one-shot
/// request, or test code). `invalidate`/`notify_idle` are no-ops.
#[derive(Debug, Default)]
pub struct NoPool;

impl PoolHandle for NoPool {
    fn settings(&self) -> PoolSettings {
        PoolSettings {
            max_response_headers_length: crate::config::Config::default().max_response_headers_length,
            max_response_drain_size: crate::config::Config::default().max_response_drain_size,
            expect_100_continue_timeout: crate::config::Config::default().expect_100_continue_timeout,
        }
    }

    fn host_header_bytes(&self) -> Option<Bytes> {
        None
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Direct
    }

    fn invalidate(&self, _reason: &Error) {}

    fn notify_idle(&self) {}
}
