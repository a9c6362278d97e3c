//! Connection state machine (component E): the public entry point. Drives
//! the request serializer (component B) to fill the write buffer (component
//! A), flushes it, then drives the response parser (component C) and body
//! reader (component D) to consume bytes back out of the same buffer.
//!
//! Shaped after `hyper::client::conn`'s split between a connection object
//! and the request/response types it produces
//! (`examples/hyperium-hyper/src/client/conn.rs`), but collapsed into one
//! `async fn` per exchange instead of a polled `Future` + dispatcher task,
//! since this crate has no `Service`/executor machinery to drive one.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Version};
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::body::{self, BodyReader, BodyWriter};
use crate::config::{Config, EXPECT_100_ERROR_SEND_THRESHOLD};
use crate::error::{Error, Result};
use crate::io::Buffered;
use crate::parse::{self, ResponseHead};
use crate::pool::{NoPool, PoolHandle};
use crate::readahead::{Liveness, ReadAhead};
use crate::request::{self, BodyLength, RequestParts};
use crate::transport::{PollReadable, Transport};

#[cfg(feature = "cookies")]
use crate::cookie::CookieJar;

/// Where a connection sits in its request/response lifecycle (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Acquiring,
    Sending,
    AwaitingResponse,
    Receiving,
    BodyReading,
    Draining,
    Disposed,
}

/// How an Expect:100-continue wait resolved.
enum ContinueOutcome {
    /// Send the body: either a 100 arrived, or the timeout expired. Neither
    /// case leaves anything behind to reuse -- the final response is still
    /// unread and gets parsed normally afterward.
    Proceed,
    /// The final response arrived early (no 100 first), but the body was
    /// small/known enough that it's sent anyway as a courtesy. The head
    /// can't be unread, so it's carried along for direct reuse.
    ProceedWithEarlyHead(ResponseHead),
    /// The final response arrived early and the body was unknown-length or
    /// large enough that sending it would be wasted work; it's withheld.
    Refused(ResponseHead),
}

/// A lightweight, cloneable handle that can cancel the exchange currently in
/// flight on a [`Connection`]. Holds only a shared flag and notifier, not a
/// reference back to the connection itself, so connection and handle can be
/// dropped independently without forming a reference cycle.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// An HTTP/1.x client connection over an arbitrary [`Transport`], driven one
/// request/response exchange at a time.
pub struct Connection<T: Transport, P: PoolHandle = NoPool> {
    io: Buffered<T>,
    cfg: Config,
    pool: P,
    state: State,
    in_use: bool,
    detached_from_pool: bool,
    connection_close: bool,
    started_sending_request_body: bool,
    body: Option<BodyReader>,
    readahead: ReadAhead,
    cancel_flag: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
    #[cfg(feature = "cookies")]
    cookies: Option<CookieJar>,
}

impl<T: Transport, P: PoolHandle> fmt::Debug for Connection<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("connection_close", &self.connection_close)
            .field("can_retry", &self.can_retry())
            .field("pool", &self.pool)
            .finish()
    }
}

impl<T: Transport> Connection<T, NoPool> {
    /// Wraps a transport with no pool at all -- for a one-shot request, or
    /// tests that don't need `PoolHandle` behavior.
    pub fn unpooled(io: T, cfg: Config) -> Connection<T, NoPool> {
        Connection::new(io, cfg, NoPool)
    }
}

impl<T: Transport, P: PoolHandle> Connection<T, P> {
    pub fn new(io: T, mut cfg: Config, pool: P) -> Connection<T, P> {
        let settings = pool.settings();
        cfg.max_response_headers_length = settings.max_response_headers_length;
        cfg.max_response_drain_size = settings.max_response_drain_size;
        cfg.expect_100_continue_timeout = settings.expect_100_continue_timeout;

        let initial_buffer_size = cfg.initial_buffer_size;
        Connection {
            io: Buffered::new(io, initial_buffer_size),
            cfg,
            pool,
            state: State::Idle,
            in_use: false,
            detached_from_pool: false,
            connection_close: false,
            started_sending_request_body: false,
            body: None,
            readahead: ReadAhead::new(),
            cancel_flag: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
            #[cfg(feature = "cookies")]
            cookies: None,
        }
    }

    #[cfg(feature = "cookies")]
    pub fn with_cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookies = Some(jar);
        self
    }

    /// Marks this connection as no longer owned by its pool. Once set, it
    /// disposes itself after the current exchange instead of going idle.
    pub fn detach_from_pool(&mut self) {
        self.detached_from_pool = true;
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            flag: Arc::clone(&self.cancel_flag),
            notify: Arc::clone(&self.cancel_notify),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn is_disposed(&self) -> bool {
        self.state == State::Disposed
    }

    /// True while a [`Self::scavenge`] or [`Self::acquire`] probe is in
    /// flight on this connection. A pool sweeping idle connections can check
    /// this to skip ones already being checked rather than queue a redundant
    /// probe behind `ReadAhead`'s single-slot guard.
    pub fn is_scavenging(&self) -> bool {
        self.readahead.is_pending()
    }

    /// False once the in-flight (or most recently failed) `send` has written
    /// at least one byte of the request body to the transport: a failure
    /// from that point on can't be safely retried on a fresh connection.
    pub fn can_retry(&self) -> bool {
        !self.started_sending_request_body
    }

    /// Sends a request and returns the parsed response head. The body (if
    /// any) is consumed separately via [`Self::read_body`].
    pub async fn send(&mut self, request: Request<Option<Bytes>>) -> Result<Response<()>> {
        self.require_state(State::Idle)?;
        if self.cancel_flag.load(Ordering::SeqCst) {
            return Err(Error::cancelled());
        }
        self.state = State::Acquiring;
        self.in_use = true;
        self.started_sending_request_body = false;

        let (parts, body) = request.into_parts();

        let cookie_header = self.cookie_header();
        let host_override = self.pool.host_header_bytes();
        let kind = self.pool.kind();

        self.state = State::Sending;
        let req_parts = RequestParts {
            method: &parts.method,
            uri: &parts.uri,
            version: parts.version,
            headers: &parts.headers,
            has_body: body.is_some(),
            kind,
            host_override: host_override.as_ref(),
            cookie_header: cookie_header.as_deref(),
        };

        let body_length = match request::encode(&mut self.io, &req_parts, &self.cfg) {
            Ok(bl) => bl,
            Err(e) => return self.fail(e),
        };

        let mut writer = BodyWriter::new(body_length);
        let mut early_head = None;
        let mut send_body = body.is_some();
        if body.is_some() && expects_continue(&parts.headers) {
            if let Err(e) = self.flush_cancellable().await {
                return self.fail(e);
            }
            let declared = match body_length {
                BodyLength::ContentLength(n) => Some(n),
                _ => None,
            };
            match self.await_continue_gate(declared).await {
                Ok(ContinueOutcome::Proceed) => {}
                Ok(ContinueOutcome::ProceedWithEarlyHead(head)) => {
                    trace!("final response arrived before 100-continue, sending body anyway");
                    self.connection_close = true;
                    early_head = Some(head);
                }
                Ok(ContinueOutcome::Refused(head)) => {
                    trace!("final response arrived before 100-continue, request body withheld");
                    self.connection_close = true;
                    early_head = Some(head);
                    send_body = false;
                }
                Err(e) => return self.fail(e),
            }
        }
        if send_body {
            if let Some(data) = body.as_deref() {
                if let Err(e) = writer.write(&mut self.io, data) {
                    return self.fail(e);
                }
                self.started_sending_request_body = true;
            }
            if let Err(e) = writer.finish(&mut self.io) {
                return self.fail(e);
            }
            if let Err(e) = self.flush_cancellable().await {
                let e = if self.started_sending_request_body { e.mark_body_started() } else { e };
                return self.fail(e);
            }
        }

        self.state = State::AwaitingResponse;
        let head = if let Some(head) = early_head {
            head
        } else {
            match parse::parse_response(&mut self.io, &self.cfg, |_| {}).await {
                Ok(head) => head,
                Err(e) => {
                    let e = if self.started_sending_request_body { e.mark_body_started() } else { e };
                    return self.fail(e);
                }
            }
        };

        self.state = State::Receiving;
        self.apply_connection_directives(&head);
        self.capture_set_cookie(&head);

        let decoded = match parse::decoded_length(&head, &parts.method) {
            Ok(d) => d,
            Err(e) => return self.fail(e),
        };
        let reader = BodyReader::new(decoded);
        if reader.forces_connection_close() {
            self.connection_close = true;
        }
        if matches!(decoded, parse::DecodedLength::RawTunnel) {
            self.detached_from_pool = true;
        }
        let reader_is_eof = reader.is_eof();
        self.body = Some(reader);
        // Left for the caller's first `read_body`/`release` call to settle,
        // even when already at EOF -- that call is what runs trailer capture
        // and the idle/disposed transition.
        self.state = if reader_is_eof { State::Draining } else { State::BodyReading };

        build_response(head)
    }

    /// Reads up to `dst.len()` bytes of the response body. Returns `0` at
    /// the body's natural end, at which point the connection has already
    /// transitioned back to idle (or disposed, if not reusable) and
    /// [`Self::body_trailers`] becomes available.
    pub async fn read_body(&mut self, dst: &mut [u8]) -> Result<usize> {
        self.require_state_one_of(&[State::BodyReading, State::Draining])?;
        let mut reader = self
            .body
            .take()
            .ok_or_else(|| Error::invalid_operation("no response body is being read"))?;
        let result = reader.read(&mut self.io, dst).await;
        self.body = Some(reader);
        match result {
            Ok(0) => {
                self.finish_body();
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => self.fail(e),
        }
    }

    pub fn body_trailers(&mut self) -> Option<HeaderMap> {
        self.body.as_mut().and_then(|b| b.take_trailers())
    }

    /// Drains and discards any unread response body, up to
    /// `max_response_drain_size`, then returns the connection to the pool
    /// (or disposes of it if draining overran the budget). Callers that
    /// don't need the body at all should call this instead of
    /// [`Self::read_body`] in a loop.
    pub async fn release(&mut self) -> Result<()> {
        match self.state {
            State::Idle | State::Disposed => return Ok(()),
            _ => {}
        }
        if let Some(mut reader) = self.body.take() {
            self.state = State::Draining;
            match body::drain(&mut reader, &mut self.io, self.cfg.max_response_drain_size).await {
                Ok(true) => {
                    self.body = Some(reader);
                }
                Ok(false) => {
                    debug!("drain exceeded max_response_drain_size, closing connection");
                    self.connection_close = true;
                    self.body = Some(reader);
                }
                Err(e) => {
                    self.pool.invalidate(&e);
                    self.state = State::Disposed;
                    return Err(e);
                }
            }
        }
        self.finish_body();
        Ok(())
    }

    /// Checks an idle connection for a stray byte or EOF that arrived while
    /// it sat unused, so a pool can evict it instead of handing it out dead.
    /// Only one scavenge may be in flight at a time; a second call while one
    /// is pending returns `Ok(Liveness::Idle)` without touching the socket.
    /// A `Dead` result disposes the connection; callers should drop it.
    pub async fn scavenge(&mut self) -> Result<Liveness> {
        self.require_state(State::Idle)?;
        if !self.readahead.try_begin() {
            return Ok(Liveness::Idle);
        }
        let result = ReadAhead::scavenge(&mut self.io).await;
        self.readahead.finish();
        match result {
            Ok(Liveness::Dead) => {
                self.state = State::Disposed;
                Ok(Liveness::Dead)
            }
            Ok(Liveness::Idle) => Ok(Liveness::Idle),
            Err(e) => {
                self.pool.invalidate(&e);
                self.state = State::Disposed;
                Err(e)
            }
        }
    }

    fn finish_body(&mut self) {
        if self.connection_close || self.detached_from_pool {
            self.state = State::Disposed;
        } else {
            self.state = State::Idle;
            self.in_use = false;
            self.pool.notify_idle();
        }
    }

    fn fail<R>(&mut self, e: Error) -> Result<R> {
        self.state = State::Disposed;
        self.pool.invalidate(&e);
        Err(e)
    }

    fn require_state(&self, expected: State) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::invalid_operation(
                "connection is not in the expected state for this operation",
            ))
        }
    }

    fn require_state_one_of(&self, expected: &[State]) -> Result<()> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::invalid_operation(
                "connection is not in the expected state for this operation",
            ))
        }
    }

    async fn flush_cancellable(&mut self) -> Result<()> {
        if self.cancel_flag.load(Ordering::SeqCst) {
            return Err(Error::cancelled());
        }
        tokio::select! {
            res = self.io.flush() => res,
            _ = self.cancel_notify.notified() => Err(Error::cancelled()),
        }
    }

    /// Waits for whichever of three things ends the Expect:100-continue
    /// hold first: the timer expiring, a literal `100 Continue` arriving, or
    /// the final response showing up early (the server didn't wait). There
    /// is no separate reader task here to notify a gate from -- the read
    /// happens right in this loop, one head at a time, via
    /// [`parse::read_one_head`], so it can react to a single `100` without
    /// waiting for `parse_response`'s informational loop to reach a terminal
    /// status that may never come until the body is sent. `declared_len` is
    /// `None` for a chunked body, which per RFC counts as "unknown length"
    /// and is treated the same as an oversized one.
    async fn await_continue_gate(&mut self, declared_len: Option<u64>) -> Result<ContinueOutcome> {
        let too_big_or_unknown = declared_len.map(|n| n > EXPECT_100_ERROR_SEND_THRESHOLD).unwrap_or(true);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.cfg.expect_100_continue_timeout) => {
                    trace!("Expect: 100-continue timed out, sending body anyway");
                    return Ok(ContinueOutcome::Proceed);
                }
                result = parse::read_one_head(&mut self.io, &self.cfg) => {
                    let head = result?;
                    if head.status.as_u16() == 100 {
                        trace!("100 continue received, releasing body-send gate");
                        return Ok(ContinueOutcome::Proceed);
                    }
                    if head.status.is_informational() {
                        continue;
                    }
                    let is_error = head.status.is_client_error() || head.status.is_server_error();
                    let is_auth_challenge = head.status == StatusCode::UNAUTHORIZED
                        || head.status == StatusCode::PROXY_AUTHENTICATION_REQUIRED;
                    if is_error && too_big_or_unknown && !is_auth_challenge {
                        return Ok(ContinueOutcome::Refused(head));
                    }
                    return Ok(ContinueOutcome::ProceedWithEarlyHead(head));
                }
            }
        }
    }

    fn apply_connection_directives(&mut self, head: &ResponseHead) {
        if head.version == Version::HTTP_10 && !header_has_token(&head.headers, http::header::CONNECTION, "keep-alive") {
            self.connection_close = true;
        }
        if header_has_token(&head.headers, http::header::CONNECTION, "close") {
            self.connection_close = true;
        }
    }

    fn capture_set_cookie(&mut self, head: &ResponseHead) {
        #[cfg(feature = "cookies")]
        {
            if self.cfg.use_cookies {
                if let Some(jar) = &mut self.cookies {
                    for v in head.headers.get_all(http::header::SET_COOKIE).iter() {
                        if let Ok(s) = v.to_str() {
                            jar.store_set_cookie(s);
                        }
                    }
                }
            }
        }
        #[cfg(not(feature = "cookies"))]
        {
            let _ = head;
        }
    }

    fn cookie_header(&self) -> Option<String> {
        #[cfg(feature = "cookies")]
        {
            if self.cfg.use_cookies {
                return self.cookies.as_ref().and_then(CookieJar::header_value);
            }
            None
        }
        #[cfg(not(feature = "cookies"))]
        {
            None
        }
    }
}

impl<T: Transport + PollReadable, P: PoolHandle> Connection<T, P> {
    /// Pre-acquire liveness probe (§4.F), for transports that can answer a
    /// synchronous readability poll (a real socket, typically). Call this
    /// right before handing an idle connection out for a new request --
    /// it's cheaper than [`Self::scavenge`] and catches the common case
    /// (peer closed while idle) without ever touching the async executor.
    /// Falls back to [`Self::scavenge`]'s buffered-read race when the
    /// transport can't answer synchronously, same as an idle connection
    /// with no pending probe support at all.
    pub async fn acquire(&mut self) -> Result<Liveness> {
        self.require_state(State::Idle)?;
        if !self.readahead.try_begin() {
            return Ok(Liveness::Idle);
        }
        let probed = ReadAhead::probe_readable_now(self.io.io_mut());
        self.readahead.finish();
        match probed {
            Some(true) => {
                self.state = State::Disposed;
                Ok(Liveness::Dead)
            }
            Some(false) => Ok(Liveness::Idle),
            None => self.scavenge().await,
        }
    }
}

fn build_response(head: ResponseHead) -> Result<Response<()>> {
    let mut builder = Response::builder().status(head.status).version(head.version);
    for (name, value) in head.headers.iter() {
        builder = builder.header(name.clone(), value.clone());
    }
    builder
        .body(())
        .map_err(|_| Error::invalid_operation("failed to assemble response from parsed head"))
}

fn expects_continue(headers: &HeaderMap) -> bool {
    headers
        .get(http::header::EXPECT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.eq_ignore_ascii_case("100-continue"))
        .unwrap_or(false)
}

fn header_has_token(headers: &HeaderMap, name: http::HeaderName, token: &str) -> bool {
    headers.get_all(name).iter().any(|v| {
        v.to_str()
            .map(|s| s.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    })
}
