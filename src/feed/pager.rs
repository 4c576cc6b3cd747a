use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::{Entity, Page};
use crate::feed::folder::Folder;
use crate::feed::state::Shared;
use crate::fetcher::PageFetcher;

/// Position of a pagination session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerState {
    /// Page most recently requested; rolled back when that request fails.
    pub page_number: u32,
    pub has_next_page: bool,
    pub loading: bool,
}

impl PagerState {
    /// No further page will ever be requested in this session.
    pub fn is_exhausted(&self) -> bool {
        !self.has_next_page
    }
}

impl Default for PagerState {
    fn default() -> Self {
        Self {
            page_number: 0,
            has_next_page: true,
            loading: false,
        }
    }
}

/// Fetched items in page order.
///
/// Append-only; keys are unique within a session.
#[derive(Debug, Clone)]
pub struct Accumulator<T: Entity> {
    items: Vec<T>,
    keys: HashSet<T::Key>,
}

impl<T: Entity> Accumulator<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Appends a page and returns the items that were actually added.
    ///
    /// The server should never repeat an item within a session; if it does,
    /// the first occurrence wins.
    pub fn append(&mut self, page: Vec<T>) -> Vec<T> {
        let mut added = Vec::with_capacity(page.len());
        for item in page {
            let key = item.key();
            if !self.keys.insert(key.clone()) {
                tracing::warn!("Dropping duplicate item {:?} from page", key);
                continue;
            }
            self.items.push(item.clone());
            added.push(item);
        }
        added
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.keys.contains(key)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Entity> Default for Accumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive right to run one fetch.
///
/// Dropping the guard without [`FetchGuard::settle`] (a cancelled or panicking
/// fetch) rolls the page number back and clears `loading`, so the pager can
/// never stay locked. The flag is always cleared under the state lock, in the
/// same update that publishes `loading == false`.
pub(crate) struct FetchGuard<T: Entity, F: Folder<T>> {
    shared: Arc<Shared<T, F>>,
    in_flight: Arc<AtomicBool>,
    page: u32,
    settled: bool,
}

impl<T: Entity, F: Folder<T>> FetchGuard<T, F> {
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Records the outcome of the fetch and releases the guard.
    fn settle(mut self, outcome: Option<Page<T>>) {
        self.settled = true;
        let in_flight = &self.in_flight;
        self.shared.update(|state| {
            match outcome {
                Some(page) => {
                    let count = page.items.len();
                    state.accept_page(page.items, page.has_next_page);
                    state.pager.loading = false;
                    tracing::info!(
                        "Loaded page {} ({} items, has_next_page={})",
                        self.page,
                        count,
                        page.has_next_page
                    );
                }
                None => {
                    state.rollback_page();
                    tracing::warn!("Page {} failed, will retry on next request", self.page);
                }
            }
            // Released before the snapshot goes out, so anyone reacting to
            // `loading == false` can start the next page.
            in_flight.store(false, Ordering::Release);
        });
    }
}

impl<T: Entity, F: Folder<T>> Drop for FetchGuard<T, F> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::debug!("Fetch of page {} abandoned", self.page);
        let in_flight = &self.in_flight;
        self.shared.update(|state| {
            state.rollback_page();
            in_flight.store(false, Ordering::Release);
        });
    }
}

/// Single-flight incremental page loader.
pub struct Pager<T: Entity, F: Folder<T>> {
    shared: Arc<Shared<T, F>>,
    fetcher: Arc<dyn PageFetcher<T>>,
    in_flight: Arc<AtomicBool>,
}

impl<T: Entity, F: Folder<T>> Pager<T, F> {
    pub(crate) fn new(shared: Arc<Shared<T, F>>, fetcher: Arc<dyn PageFetcher<T>>) -> Self {
        Self {
            shared,
            fetcher,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims the next page, or `None` when a fetch is already running or the
    /// listing is exhausted. Never waits.
    pub(crate) fn try_begin(&self) -> Option<FetchGuard<T, F>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Page load already in flight, skipping");
            return None;
        }

        match self.shared.update_if(|state| state.begin_page()) {
            Some(page) => Some(FetchGuard {
                shared: self.shared.clone(),
                in_flight: self.in_flight.clone(),
                page,
                settled: false,
            }),
            None => {
                tracing::debug!("No further pages, skipping");
                self.in_flight.store(false, Ordering::Release);
                None
            }
        }
    }

    /// Runs the fetch claimed by `guard` to completion.
    pub(crate) async fn complete(&self, guard: FetchGuard<T, F>) {
        let outcome = self.fetcher.fetch_page(guard.page()).await;
        guard.settle(outcome);
    }
}
