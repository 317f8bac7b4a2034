//! Cancellable task handles.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A spawned task paired with its cancellation token.
///
/// Cancellation is cooperative: the task observes its token at its next
/// suspension point and runs its own cleanup before finishing.
/// [`TaskHandle::cancel`] returns only after that cleanup is done.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawn `body` with a fresh token.
    pub fn spawn<F, Fut>(body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let join = tokio::spawn(body(token.clone()));
        Self { token, join }
    }

    /// Spawn `body` with a token that is also cancelled when `parent` is.
    pub fn spawn_child<F, Fut>(parent: &CancellationToken, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let join = tokio::spawn(body(token.clone()));
        Self { token, join }
    }

    /// Request cancellation and wait until the task has finished.
    pub async fn cancel(self) {
        self.token.cancel();
        self.join().await;
    }

    /// Wait for the task to finish on its own.
    pub async fn join(self) {
        if let Err(e) = self.join.await
            && e.is_panic()
        {
            warn!("Task panicked: {}", e);
        }
    }

    /// Whether the task has already finished.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// The task's cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_cancel_waits_for_cleanup() {
        let cleaned_up = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cleaned_up);
        let handle = TaskHandle::spawn(move |token| async move {
            token.cancelled().await;
            tokio::task::yield_now().await;
            flag.store(true, Ordering::SeqCst);
        });

        handle.cancel().await;
        assert!(cleaned_up.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = CancellationToken::new();
        let handle = TaskHandle::spawn_child(&parent, |token| async move {
            token.cancelled().await;
        });
        parent.cancel();
        assert!(handle.token().is_cancelled());
        handle.join().await;
    }
}
