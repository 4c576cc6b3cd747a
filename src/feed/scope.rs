use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancellation scope for the background work of one feed.
///
/// Feeds take a child of the application scope. Cancelling a child stops its
/// tasks without touching siblings; cancelling the parent stops all of them.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    cancel: CancellationToken,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope that is cancelled along with this one.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    /// Spawns `fut`, dropping it as soon as the scope is cancelled.
    ///
    /// The task yields `None` when it was cut short.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let scope = self.clone();
        tokio::spawn(async move { scope.run(fut).await })
    }

    /// Drives `fut` in place until it finishes or the scope is cancelled.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_spawn_completes() {
        let scope = Scope::new();
        let handle = scope.spawn(async { 7 });
        assert_eq!(handle.await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_task() {
        let scope = Scope::new();
        let handle = scope.spawn(std::future::pending::<()>());
        scope.cancel();
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_spawn_after_cancel_does_not_run() {
        let scope = Scope::new();
        scope.cancel();
        let handle = scope.spawn(async { 1 });
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_child_cancel_leaves_sibling_running() {
        let root = Scope::new();
        let a = root.child();
        let b = root.child();

        a.cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!root.is_cancelled());

        let out = b
            .spawn(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                "done"
            })
            .await
            .unwrap();
        assert_eq!(out, Some("done"));
    }

    #[tokio::test]
    async fn test_parent_cancel_reaches_children() {
        let root = Scope::new();
        let child = root.child();
        root.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }
}
