//! Cancellation token for cooperative cancellation.

use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
    notify: Notify,
    parent: Option<CancellationToken>,
}

/// A cloneable token for cooperative cancellation.
///
/// Cancellation is idempotent; only the first reason is kept. A child token
/// reports cancellation when it or any ancestor is cancelled, so one
/// server-wide token can stop every in-flight run.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a new root token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that is also cancelled when `self` is.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                parent: Some(self.clone()),
                ..Inner::default()
            }),
        }
    }

    /// Requests cancellation. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let reason = reason.into();
            info!(reason = %reason, "Cancellation requested");
            *self.inner.reason.write() = Some(reason);
            self.inner.notify.notify_waiters();
        }
    }

    /// Returns whether this token or an ancestor was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self.inner.parent.as_ref().is_some_and(Self::is_cancelled)
    }

    /// Returns the cancellation reason, nearest token first.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if let Some(reason) = self.inner.reason.read().clone() {
            return Some(reason);
        }
        self.inner.parent.as_ref().and_then(Self::reason)
    }

    /// Resolves once this token or an ancestor is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match &self.inner.parent {
                Some(parent) => {
                    tokio::select! {
                        () = self.own_cancelled() => {}
                        () = parent.cancelled() => {}
                    }
                }
                None => self.own_cancelled().await,
            }
        })
    }

    async fn own_cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.cancelled.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}
