//! Cancellable event subscriptions.
//!
//! Every callback registration with the adapter (power state, scan results,
//! disconnect notifications) and every filtered view of the action stream is
//! surfaced as a [`Subscription`]: an unbounded, order-preserving queue whose
//! unsubscribe hook runs exactly once, when the subscription is closed or
//! dropped. Holding the subscription is holding the registration.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;

/// Sending half of a subscription.
pub type Emitter<T> = mpsc::UnboundedSender<T>;

type CloseHook = Box<dyn FnOnce() + Send + Sync>;

/// An unbounded, ordered event queue with a scoped unsubscribe hook.
///
/// # Example
///
/// ```
/// use tagprobe_core::Subscription;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (tx, mut sub) = Subscription::channel();
/// tx.send(1).unwrap();
/// tx.send(2).unwrap();
/// assert_eq!(sub.recv().await, Some(1));
/// assert_eq!(sub.recv().await, Some(2));
/// # }
/// ```
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    on_close: Option<CloseHook>,
}

impl<T> Subscription<T> {
    /// Wrap a receiver without an unsubscribe hook.
    pub fn new(receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            receiver,
            on_close: None,
        }
    }

    /// Create a connected emitter/subscription pair.
    pub fn channel() -> (Emitter<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx))
    }

    /// Attach the hook that releases the underlying registration.
    #[must_use]
    pub fn on_close(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once every emitter is gone and the queue is drained.
    /// Cancel-safe: a pending `recv` that loses a `select!` does not lose an
    /// event.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Unsubscribe now. Equivalent to dropping the subscription.
    pub fn close(self) {
        drop(self);
    }

    /// Whether the emitting side has gone away.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        // Stop accepting events before releasing the registration so nothing
        // can be delivered after unsubscribe.
        self.receiver.close();
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.receiver.is_closed())
            .field("has_hook", &self.on_close.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_preserves_order() {
        let (tx, mut sub) = Subscription::channel();
        for i in 0..100 {
            tx.send(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(sub.recv().await, Some(i));
        }
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn test_hook_runs_once_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let (tx, sub) = Subscription::<u8>::channel();
        let sub = sub.on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        sub.close();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The emitter observes the unsubscribe.
        assert!(tx.is_closed());
        assert!(tx.send(1).is_err());
    }

    #[tokio::test]
    async fn test_stream_ends_when_emitters_drop() {
        let (tx, sub) = Subscription::channel();
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        drop(tx);
        let items: Vec<_> = sub.collect().await;
        assert_eq!(items, vec!["a", "b"]);
    }
}
