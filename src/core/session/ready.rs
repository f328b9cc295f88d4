//! Readiness future handed out by [`LiveClient::connect`](super::LiveClient::connect).
//!
//! Each connect attempt owns exactly one [`ReadySignal`] / [`ReadyFuture`]
//! pair. The signal resolves the future the first time the relay sends its
//! readiness handshake; dropping the signal (the transport task ended) resolves
//! it with [`LiveError::ConnectionClosed`]. Clones of the future observe the
//! same outcome.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::base::{LiveError, LiveResult};

static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

/// Cloneable future that completes once the relay reports readiness.
#[derive(Clone)]
pub struct ReadyFuture {
    attempt: u64,
    settled: Arc<AtomicBool>,
    inner: Shared<BoxFuture<'static, LiveResult<()>>>,
}

impl ReadyFuture {
    /// Identifier of the connect attempt this future belongs to.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Whether both futures track the same connect attempt.
    pub fn is_same_attempt(&self, other: &ReadyFuture) -> bool {
        self.attempt == other.attempt
    }

    /// Whether the outcome is already decided, either because the relay
    /// signalled readiness or because the transport ended first.
    ///
    /// Turns true as soon as the transport task settles the attempt, before
    /// any clone has been polled.
    pub fn is_resolved(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }
}

impl Future for ReadyFuture {
    type Output = LiveResult<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for ReadyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyFuture")
            .field("attempt", &self.attempt)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Resolving half, owned by the transport task.
pub(crate) struct ReadySignal {
    settled: Arc<AtomicBool>,
    tx: Option<oneshot::Sender<()>>,
}

impl ReadySignal {
    /// Resolve the paired future. Returns `false` if it was already resolved.
    pub(crate) fn resolve(&mut self) -> bool {
        match self.tx.take() {
            Some(tx) => {
                self.settled.store(true, Ordering::SeqCst);
                // The receiver lives inside the shared future, which may have
                // been dropped by every caller; nothing to notify then.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

impl Drop for ReadySignal {
    fn drop(&mut self) {
        // Dropping an unresolved sender fails the future
        self.settled.store(true, Ordering::SeqCst);
    }
}

/// Create the readiness pair for a new connect attempt.
pub(crate) fn ready_pair() -> (ReadySignal, ReadyFuture) {
    let attempt = NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = oneshot::channel();
    let inner = rx
        .map(|outcome| {
            outcome.map_err(|_| LiveError::closed("connection closed before the server was ready"))
        })
        .boxed()
        .shared();

    let settled = Arc::new(AtomicBool::new(false));
    (
        ReadySignal {
            settled: settled.clone(),
            tx: Some(tx),
        },
        ReadyFuture {
            attempt,
            settled,
            inner,
        },
    )
}
