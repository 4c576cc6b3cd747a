//! Incremental feeds with live reconciliation.
//!
//! ```text
//! load_next_page → Pager → PageFetcher → Accumulator → Folder ─┐
//!                                                              ├→ compose → watch
//! ChangeBus → Reconciler → Refetcher → PatchMap ───────────────┘
//! ```
//!
//! A [`Feed`] owns one pagination session. Pages are fetched one at a time;
//! redundant load requests are dropped rather than queued. Change batches from
//! the [`ChangeBus`](crate::listener::ChangeBus) refresh items already on
//! screen without reordering them or touching pagination. Every change to
//! either side republishes a [`FeedSnapshot`] to subscribers.

pub mod compositor;
pub mod folder;
pub mod pager;
pub mod reconciler;
pub mod scope;
pub mod state;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::domain::Entity;
use crate::fetcher::{PageFetcher, Refetcher};
use crate::listener::Change;

pub use compositor::{FeedSnapshot, PatchMap};
pub use folder::{DateFolder, Flat, Folder, ViewNode};
pub use pager::{Accumulator, PagerState};
pub use reconciler::{Reconciler, DEFAULT_REFETCH_CONCURRENCY};
pub use scope::Scope;

use pager::Pager;
use state::Shared;

/// Feed of items shown one per row.
pub type PlainFeed<T> = Feed<T, Flat>;

/// Feed of items grouped under date headers.
pub type GroupedFeed<T> = Feed<T, DateFolder>;

pub struct Feed<T: Entity, F: Folder<T>> {
    shared: Arc<Shared<T, F>>,
    pager: Arc<Pager<T, F>>,
    scope: Scope,
}

impl<T: Entity, F: Folder<T>> Feed<T, F> {
    /// Requests the next page without waiting for it.
    ///
    /// A no-op while a page is loading or once the listing is exhausted.
    pub fn load_next_page(&self) {
        if let Some(guard) = self.pager.try_begin() {
            let pager = self.pager.clone();
            self.scope.spawn(async move { pager.complete(guard).await });
        }
    }

    /// Like [`Feed::load_next_page`], but waits for the fetch to settle.
    ///
    /// Returns `false` when no fetch was started.
    pub async fn load_next_page_and_wait(&self) -> bool {
        match self.pager.try_begin() {
            Some(guard) => self.scope.run(self.pager.complete(guard)).await.is_some(),
            None => false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot<F::Node>> {
        self.shared.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot<F::Node> {
        self.shared.snapshot()
    }

    pub fn items(&self) -> Vec<F::Node> {
        self.shared.snapshot().items
    }

    pub fn has_next_page(&self) -> bool {
        self.shared.read(|state| state.pager.has_next_page)
    }

    pub fn loading(&self) -> bool {
        self.shared.read(|state| state.pager.loading)
    }

    pub fn pager_state(&self) -> PagerState {
        self.shared.read(|state| state.pager)
    }

    /// Raw fetched items in page order, without patches applied.
    pub fn accumulated(&self) -> Vec<T> {
        self.shared.read(|state| state.accumulator.items().to_vec())
    }

    /// Stops reconciliation and any in-flight fetches. Idempotent.
    pub fn dispose(&self) {
        if !self.scope.is_cancelled() {
            tracing::debug!("Disposing feed");
            self.scope.cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.scope.is_cancelled()
    }
}

impl<T: Entity, F: Folder<T>> Drop for Feed<T, F> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

pub struct FeedBuilder<T: Entity> {
    fetcher: Arc<dyn PageFetcher<T>>,
    refetcher: Arc<dyn Refetcher<T>>,
    changes: Option<broadcast::Receiver<Change>>,
    refetch_concurrency: usize,
    scope: Option<Scope>,
}

impl<T: Entity> FeedBuilder<T> {
    pub fn new(fetcher: Arc<dyn PageFetcher<T>>, refetcher: Arc<dyn Refetcher<T>>) -> Self {
        Self {
            fetcher,
            refetcher,
            changes: None,
            refetch_concurrency: DEFAULT_REFETCH_CONCURRENCY,
            scope: None,
        }
    }

    /// Keeps the feed reconciled against this change subscription.
    pub fn changes(mut self, changes: broadcast::Receiver<Change>) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn refetch_concurrency(mut self, concurrency: usize) -> Self {
        self.refetch_concurrency = concurrency;
        self
    }

    /// Parent of the feed's own scope. Cancelling it disposes the feed;
    /// disposing the feed never cancels it. Defaults to a fresh root scope.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn plain(self) -> PlainFeed<T>
    where
        Flat: Folder<T>,
    {
        self.build(Flat)
    }

    pub fn grouped(self, folder: DateFolder) -> GroupedFeed<T>
    where
        DateFolder: Folder<T>,
    {
        self.build(folder)
    }

    /// Builds the feed. Must be called inside a Tokio runtime when a change
    /// subscription was given, since the reconciler starts right away.
    pub fn build<F: Folder<T>>(self, folder: F) -> Feed<T, F> {
        let scope = self.scope.map(|parent| parent.child()).unwrap_or_default();
        let shared = Arc::new(Shared::new(folder));
        let pager = Arc::new(Pager::new(shared.clone(), self.fetcher));

        if let Some(changes) = self.changes {
            let reconciler = Reconciler::new(
                shared.clone(),
                self.refetcher,
                self.refetch_concurrency,
                scope.clone(),
            );
            scope.spawn(reconciler.run(changes));
        }

        Feed {
            shared,
            pager,
            scope,
        }
    }
}
