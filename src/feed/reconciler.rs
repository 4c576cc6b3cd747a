use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Semaphore};

use crate::domain::Entity;
use crate::feed::folder::Folder;
use crate::feed::scope::Scope;
use crate::feed::state::Shared;
use crate::fetcher::Refetcher;
use crate::listener::Change;

pub const DEFAULT_REFETCH_CONCURRENCY: usize = 5;

/// Keeps already displayed items fresh as change notifications arrive.
///
/// Batches are handled one at a time. Each batch is resolved against the
/// items present at that moment, refetched concurrently, and published as a
/// single snapshot.
pub struct Reconciler<T: Entity, F: Folder<T>> {
    shared: Arc<Shared<T, F>>,
    refetcher: Arc<dyn Refetcher<T>>,
    semaphore: Arc<Semaphore>,
    scope: Scope,
}

impl<T: Entity, F: Folder<T>> Reconciler<T, F> {
    pub(crate) fn new(
        shared: Arc<Shared<T, F>>,
        refetcher: Arc<dyn Refetcher<T>>,
        concurrency: usize,
        scope: Scope,
    ) -> Self {
        Self {
            shared,
            refetcher,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            scope,
        }
    }

    /// Consumes change batches until the bus closes or the scope is cancelled.
    pub async fn run(self, mut changes: broadcast::Receiver<Change>) {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    self.reconcile(&change).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Feed fell behind the change bus, {} batches skipped",
                        skipped
                    );
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Change bus closed, reconciliation stopped");
                    break;
                }
            }
        }
    }

    /// Refetches every present item `change` concerns and publishes the
    /// results together. Returns how many items were patched.
    pub async fn reconcile(&self, change: &Change) -> usize {
        let targets = self.shared.read(|state| state.affected(change));
        if targets.is_empty() {
            tracing::debug!("No displayed items affected by {:?}", change);
            return 0;
        }

        tracing::debug!("Refetching {} items for {:?}", targets.len(), change);

        let mut keys = Vec::with_capacity(targets.len());
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let refetcher = self.refetcher.clone();
            let semaphore = self.semaphore.clone();
            let key = target.key();

            let handle = self.scope.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                refetcher.refetch(&target).await
            });
            keys.push(key);
            handles.push(handle);
        }

        let results = join_all(handles).await;
        let mut refreshed = Vec::with_capacity(results.len());
        for (key, result) in keys.into_iter().zip(results) {
            match result {
                Ok(Some(Some(item))) if item.key() == key => refreshed.push(item),
                Ok(Some(Some(item))) => {
                    tracing::warn!(
                        "Refetch of {:?} returned {:?}, ignoring",
                        key,
                        item.key()
                    );
                }
                Ok(Some(None)) => {
                    tracing::debug!("Refetch of {:?} failed, keeping stale value", key);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Refetch task for {:?} failed: {}", key, e);
                }
            }
        }

        if refreshed.is_empty() || self.scope.is_cancelled() {
            return 0;
        }

        self.shared
            .update_if(|state| match state.apply_patches(refreshed) {
                0 => None,
                applied => Some(applied),
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::domain::Manga;
    use crate::feed::folder::Flat;
    use crate::listener::ChangeBus;

    fn manga(id: i64) -> Manga {
        Manga::new(id, "1", format!("Manga {}", id))
    }

    /// Tracks how many refetches run at once.
    #[derive(Default)]
    struct SlowRefetcher {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Refetcher<Manga> for SlowRefetcher {
        async fn refetch(&self, current: &Manga) -> Option<Manga> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);

            let mut fresh = current.clone();
            fresh.in_library = true;
            Some(fresh)
        }
    }

    /// Answers every refetch with a different manga.
    struct WrongKeyRefetcher;

    #[async_trait]
    impl Refetcher<Manga> for WrongKeyRefetcher {
        async fn refetch(&self, current: &Manga) -> Option<Manga> {
            Some(manga(current.id + 100))
        }
    }

    fn shared_with(ids: &[i64]) -> Arc<Shared<Manga, Flat>> {
        let shared = Arc::new(Shared::new(Flat));
        let items = ids.iter().map(|&id| manga(id)).collect();
        shared.update(|state| state.accept_page(items, true));
        shared
    }

    #[tokio::test]
    async fn test_refetches_are_bounded() {
        let shared = shared_with(&[1, 2, 3, 4, 5, 6]);
        let refetcher = Arc::new(SlowRefetcher::default());
        let reconciler = Reconciler::new(shared.clone(), refetcher.clone(), 2, Scope::new());

        let applied = reconciler
            .reconcile(&Change::Manga(vec![1, 2, 3, 4, 5, 6]))
            .await;

        assert_eq!(applied, 6);
        assert!(refetcher.peak.load(Ordering::SeqCst) <= 2);
        assert!(shared.snapshot().items.iter().all(|m| m.in_library));
    }

    #[tokio::test]
    async fn test_mismatched_refetch_is_ignored() {
        let shared = shared_with(&[1]);
        let reconciler =
            Reconciler::new(shared.clone(), Arc::new(WrongKeyRefetcher), 1, Scope::new());
        let mut rx = shared.subscribe();
        rx.mark_unchanged();

        assert_eq!(reconciler.reconcile(&Change::Manga(vec![1])).await, 0);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(shared.snapshot().items, vec![manga(1)]);
    }

    #[tokio::test]
    async fn test_cancelled_scope_publishes_nothing() {
        let shared = shared_with(&[1, 2]);
        let scope = Scope::new();
        let reconciler = Reconciler::new(
            shared.clone(),
            Arc::new(SlowRefetcher::default()),
            DEFAULT_REFETCH_CONCURRENCY,
            scope.clone(),
        );
        let mut rx = shared.subscribe();
        rx.mark_unchanged();

        scope.cancel();
        assert_eq!(reconciler.reconcile(&Change::Manga(vec![1, 2])).await, 0);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_run_stops_when_bus_closes() {
        let shared = shared_with(&[1]);
        let reconciler = Reconciler::new(
            shared,
            Arc::new(SlowRefetcher::default()),
            DEFAULT_REFETCH_CONCURRENCY,
            Scope::new(),
        );
        let (tx, rx) = broadcast::channel(4);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), reconciler.run(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_lagged_receiver_skips_ahead_and_keeps_running() {
        let shared = shared_with(&[1, 2, 3]);
        let refetcher = Arc::new(SlowRefetcher::default());
        let reconciler = Reconciler::new(
            shared.clone(),
            refetcher,
            DEFAULT_REFETCH_CONCURRENCY,
            Scope::new(),
        );
        let bus = ChangeBus::with_capacity(1);
        let rx = bus.subscribe();

        bus.manga_changed(vec![1]);
        bus.manga_changed(vec![2]);
        bus.manga_changed(vec![3]);
        drop(bus);

        tokio::time::timeout(Duration::from_secs(1), reconciler.run(rx))
            .await
            .unwrap();

        let in_library: Vec<bool> = shared
            .snapshot()
            .items
            .iter()
            .map(|m| m.in_library)
            .collect();
        assert_eq!(in_library, vec![false, false, true]);
    }
}
