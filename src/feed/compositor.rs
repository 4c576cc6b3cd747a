//! Combines folded pages with reconciled patches into what the UI shows.

use std::collections::HashMap;

use crate::domain::Entity;
use crate::feed::folder::Folder;
use crate::feed::state::FeedState;

/// Latest known value per key, built by the reconciler.
///
/// Entries are only ever superseded, never evicted.
#[derive(Debug, Clone)]
pub struct PatchMap<T: Entity> {
    patches: HashMap<T::Key, T>,
}

impl<T: Entity> PatchMap<T> {
    pub fn new() -> Self {
        Self {
            patches: HashMap::new(),
        }
    }

    pub fn insert(&mut self, item: T) {
        self.patches.insert(item.key(), item);
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.patches.get(key)
    }

    /// The patched value of `item`, or `item` itself.
    pub fn resolve<'a>(&'a self, item: &'a T) -> &'a T {
        self.patches.get(&item.key()).unwrap_or(item)
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

impl<T: Entity> Default for PatchMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a feed exposes, recomputed on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot<N> {
    pub items: Vec<N>,
    pub page_number: u32,
    pub has_next_page: bool,
    pub loading: bool,
}

impl<N> Default for FeedSnapshot<N> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            page_number: 0,
            has_next_page: true,
            loading: false,
        }
    }
}

/// Patches already-folded nodes, keeping their order. Never re-folds or re-fetches.
pub fn compose<T, F>(nodes: &[F::Node], patches: &PatchMap<T>) -> Vec<F::Node>
where
    T: Entity,
    F: Folder<T>,
{
    nodes.iter().map(|node| F::patch(node, patches)).collect()
}

pub fn render<T, F>(state: &FeedState<T, F>) -> FeedSnapshot<F::Node>
where
    T: Entity,
    F: Folder<T>,
{
    FeedSnapshot {
        items: compose::<T, F>(&state.nodes, &state.patches),
        page_number: state.pager.page_number,
        has_next_page: state.pager.has_next_page,
        loading: state.pager.loading,
    }
}
