//! A standalone HTTP/1.x client connection core.
//!
//! This crate owns exactly one thing: driving a single request/response
//! exchange (and, serially, the next one) over an already-established byte
//! stream -- framing, header serialization/parsing, chunked transfer
//! encoding, and the handful of keep-alive/Expect-100/cancellation rules
//! that make HTTP/1.1 connection reuse safe. TLS, DNS, connection pooling,
//! and retries all live outside it, reached through the [`Transport`] and
//! [`PoolHandle`] trait seams.
//!
//! Modeled on the h1 half of `hyper::client::conn`, minus its `Service`/
//! executor machinery: there is no polled `Future` to drive from a task,
//! just `async fn`s a caller awaits directly.

mod body;
mod config;
mod conn;
#[cfg(feature = "cookies")]
mod cookie;
mod error;
mod header;
mod io;
mod parse;
mod pool;
mod readahead;
mod request;
mod transport;

pub use config::{Config, HeaderDecoder, HeaderEncoder};
pub use conn::{CancelHandle, Connection};
#[cfg(feature = "cookies")]
pub use cookie::CookieJar;
pub use error::{Error, Result};
pub use header::{HeaderCategory, HeaderDescriptor};
pub use pool::{ConnectionKind, NoPool, PoolHandle, PoolSettings};
pub use readahead::Liveness;
pub use transport::{PollReadable, Transport};
