use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::domain::Entity;
use crate::feed::compositor::{render, FeedSnapshot, PatchMap};
use crate::feed::folder::Folder;
use crate::feed::pager::{Accumulator, PagerState};
use crate::listener::Change;

/// Everything one feed owns. Mutated only through [`Shared::update`].
pub struct FeedState<T: Entity, F: Folder<T>> {
    pub pager: PagerState,
    pub accumulator: Accumulator<T>,
    pub folder: F,
    pub nodes: Vec<F::Node>,
    pub patches: PatchMap<T>,
}

impl<T: Entity, F: Folder<T>> FeedState<T, F> {
    pub fn new(folder: F) -> Self {
        Self {
            pager: PagerState::default(),
            accumulator: Accumulator::new(),
            folder,
            nodes: Vec::new(),
            patches: PatchMap::new(),
        }
    }

    /// Advances to the next page and marks it loading.
    pub fn begin_page(&mut self) -> Option<u32> {
        if self.pager.is_exhausted() {
            return None;
        }
        self.pager.page_number += 1;
        self.pager.loading = true;
        Some(self.pager.page_number)
    }

    /// Undoes [`FeedState::begin_page`] after a failed attempt.
    pub fn rollback_page(&mut self) {
        self.pager.page_number = self.pager.page_number.saturating_sub(1);
        self.pager.loading = false;
    }

    pub fn accept_page(&mut self, items: Vec<T>, has_next_page: bool) {
        let added = self.accumulator.append(items);
        let nodes = self.folder.fold(&added);
        self.nodes.extend(nodes);
        self.pager.has_next_page = has_next_page;
    }

    /// Displayed values of the present items a change concerns.
    pub fn affected(&self, change: &Change) -> Vec<T> {
        self.accumulator
            .iter()
            .map(|item| self.patches.resolve(item))
            .filter(|item| item.affected_by(change))
            .cloned()
            .collect()
    }

    /// Stores patches for keys still present. Returns how many were stored.
    pub fn apply_patches(&mut self, items: Vec<T>) -> usize {
        let mut applied = 0;
        for item in items {
            if self.accumulator.contains(&item.key()) {
                self.patches.insert(item);
                applied += 1;
            }
        }
        applied
    }
}

/// Feed state plus the channel its snapshots are published on.
pub(crate) struct Shared<T: Entity, F: Folder<T>> {
    state: Mutex<FeedState<T, F>>,
    tx: watch::Sender<FeedSnapshot<F::Node>>,
}

impl<T: Entity, F: Folder<T>> Shared<T, F> {
    pub fn new(folder: F) -> Self {
        let state = FeedState::new(folder);
        let (tx, _) = watch::channel(render(&state));
        Self {
            state: Mutex::new(state),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState<T, F>> {
        // State is only touched by short synchronous sections; a panic in one
        // leaves it consistent enough to keep displaying.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutates the state and publishes a fresh snapshot.
    pub fn update<R>(&self, f: impl FnOnce(&mut FeedState<T, F>) -> R) -> R {
        let mut state = self.lock();
        let out = f(&mut state);
        self.tx.send_replace(render(&state));
        out
    }

    /// Like [`Shared::update`], but only publishes when `f` returns `Some`.
    pub fn update_if<R>(&self, f: impl FnOnce(&mut FeedState<T, F>) -> Option<R>) -> Option<R> {
        let mut state = self.lock();
        let out = f(&mut state)?;
        self.tx.send_replace(render(&state));
        Some(out)
    }

    pub fn read<R>(&self, f: impl FnOnce(&FeedState<T, F>) -> R) -> R {
        f(&self.lock())
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot<F::Node>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot<F::Node> {
        self.tx.borrow().clone()
    }
}
