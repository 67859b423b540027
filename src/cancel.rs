//! Request-scoped cancellation.

use std::fmt;
use std::future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Cancellation signal shared between a caller and an in-flight request.
///
/// A token fires when [`cancel`](Self::cancel) is called on any clone, or
/// when its deadline (if any) passes. Transports race their work against
/// [`cancelled`](Self::cancelled) and give up with
/// [`Error::Cancelled`](crate::Error::Cancelled).
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    notify: watch::Sender<bool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Creates a token that only fires when cancelled explicitly.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Creates a token that also fires once `deadline` is reached.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Creates a token that also fires after `timeout` from now. A timeout
    /// too large to represent means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (notify, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify,
                deadline,
            }),
        }
    }

    /// Cancels every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.send_replace(true);
    }

    /// Returns `true` once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self
                .inner
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The deadline this token was created with, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Completes when the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.notify.subscribe();
        let explicit = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // sender lives as long as `self`; nothing left to wait for
                    future::pending::<()>().await;
                }
            }
        };

        match self.inner.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = explicit => {}
                    _ = sleep_until(deadline) => {}
                }
            }
            None => explicit.await,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
