//! Cancellation context.
//!
//! One [`CancellationToken`] is shared network-wide. Every suspension point
//! a process can reach — `Port::send`/`Port::receive`,
//! `Connection::offer`/`Connection::poll`, explicit sleeps, and any I/O a
//! process implementation performs — must race against
//! [`CancellationToken::cancelled`] so a `Network` shutdown propagates
//! without processes needing to poll a flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use event_listener::{Event, Listener};

struct Inner {
    cancelled: AtomicBool,
    event: Event,
}

/// A cheap, cloneable handle used to request and observe cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                event: Event::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent: only the first call wakes waiters.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.event.notify(usize::MAX);
        }
    }

    /// Whether `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once `cancel` has been called.
    ///
    /// Safe to race in a `futures::select!`/`flume::select!` arm alongside
    /// the operation being cancelled, the same way the reference hubs race
    /// their command channels against each other.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let listener = self.inner.event.listen();
            // Re-check after registering the listener to avoid missing a
            // notification that fired between the check above and `listen`.
            if self.is_cancelled() {
                return;
            }
            listener.await;
        }
    }

    /// Create a token that is cancelled when either `self` or `other` is.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        let parent = self.clone();
        let child_for_task = child.clone();
        compio::runtime::spawn(async move {
            parent.cancelled().await;
            child_for_task.cancel();
        })
        .detach();
        child
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
