//! Read-ahead / liveness probing (component F).
//!
//! While a connection sits idle in the pool, a background task may poll it
//! for a stray byte or EOF so a dead connection can be evicted before it's
//! handed to a caller. This module holds that single pending check and
//! answers the two questions the pool needs: "is this connection still
//! alive right now" (pre-acquire) and "did anything arrive while idle"
//! (scavenge time).

use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::Result;
use crate::io::Buffered;
use crate::transport::{PollReadable, Transport};

/// At most one liveness check is ever in flight for a given connection; this
/// type exists so callers can't start a second one while one is pending.
#[derive(Default)]
pub(crate) struct ReadAhead {
    pending: bool,
}

/// The outcome of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Nothing has arrived; the connection is presumed alive.
    Idle,
    /// The peer closed (or sent unexpected bytes) while we were idle -- the
    /// connection must be discarded, not handed out.
    Dead,
}

impl ReadAhead {
    pub(crate) fn new() -> ReadAhead {
        ReadAhead { pending: false }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    /// Begins a check; returns `false` (and does nothing) if one is already
    /// running, modeling the CAS-guarded single-slot invariant.
    pub(crate) fn try_begin(&mut self) -> bool {
        if self.pending {
            false
        } else {
            self.pending = true;
            true
        }
    }

    pub(crate) fn finish(&mut self) {
        self.pending = false;
    }

    /// Cheap, non-blocking liveness check used right before a connection is
    /// handed out of the pool. Forwards to a transport's own readiness probe
    /// ([`PollReadable`]); callers that already hold a real task `Context`
    /// (e.g. driving their own manual `Future`) should use this directly.
    pub(crate) fn probe_readable<T>(io: &mut T, cx: &mut Context<'_>) -> Poll<bool>
    where
        T: PollReadable,
    {
        io.poll_readable_now(cx)
    }

    /// One-shot convenience over [`Self::probe_readable`] for callers (this
    /// crate's own `Connection::acquire`, or a pool with no task context of
    /// its own to poll from) that just want a single non-blocking answer.
    /// `None` means the transport couldn't answer synchronously -- that's
    /// not "pending, try again later" the way a real `.await` would treat
    /// it, it means "fall back to a buffered read instead", so there's
    /// nothing to usefully wake on and a discarding waker is correct here.
    pub(crate) fn probe_readable_now<T>(io: &mut T) -> Option<bool>
    where
        T: PollReadable,
    {
        let mut cx = Context::from_waker(std::task::Waker::noop());
        match Self::probe_readable(io, &mut cx) {
            Poll::Ready(has_bytes) => Some(has_bytes),
            Poll::Pending => None,
        }
    }

    /// Scavenge-time check: a connection sitting idle should have nothing to
    /// read. Races a zero-duration timer against a real buffered read --
    /// `tokio::time::timeout` polls the read first, so if bytes or EOF are
    /// already available this resolves to that outcome instead of the timer.
    /// A zero-byte read means a clean EOF (dead); a successful nonzero-byte
    /// read means the peer is misbehaving (also dead, since nothing should
    /// arrive outside of a response to a request we sent); the timer firing
    /// first means nothing is available yet, so the connection is presumed
    /// alive.
    pub(crate) async fn scavenge<T: Transport>(buf: &mut Buffered<T>) -> Result<Liveness> {
        match tokio::time::timeout(Duration::from_millis(0), buf.initial_fill()).await {
            Ok(Ok(_)) => Ok(Liveness::Dead),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(Liveness::Idle),
        }
    }
}
