//! Process-wide change notifications.
//!
//! Anything that mutates an entity on the server (marking chapters read,
//! adding a manga to the library) publishes a [`Change`] here. Every open feed
//! holds its own receiver and reconciles the items it has already displayed.

use tokio::sync::broadcast;

pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// A batch of entities that changed remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// These manga ids changed.
    Manga(Vec<i64>),
    /// These chapter ids changed.
    ChapterIds(Vec<i64>),
    /// Chapters under `manga_id` changed. `None` means all of them.
    ChapterIndexes {
        manga_id: i64,
        indexes: Option<Vec<i32>>,
    },
}

impl Change {
    /// A change that cannot match any item.
    pub fn is_empty(&self) -> bool {
        match self {
            Change::Manga(ids) | Change::ChapterIds(ids) => ids.is_empty(),
            Change::ChapterIndexes { indexes, .. } => {
                indexes.as_ref().is_some_and(|indexes| indexes.is_empty())
            }
        }
    }
}

/// Read-only fan-out of [`Change`] batches to every subscribed feed.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<Change>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }

    /// Publish a change. Returns how many feeds received it.
    pub fn publish(&self, change: Change) -> usize {
        if change.is_empty() {
            return 0;
        }
        tracing::debug!("Publishing change: {:?}", change);
        // No subscribers is not an error; nobody is displaying anything.
        self.tx.send(change).unwrap_or(0)
    }

    pub fn manga_changed(&self, ids: Vec<i64>) -> usize {
        self.publish(Change::Manga(ids))
    }

    pub fn chapters_changed(&self, ids: Vec<i64>) -> usize {
        self.publish(Change::ChapterIds(ids))
    }

    pub fn chapter_indexes_changed(&self, manga_id: i64, indexes: Option<Vec<i32>>) -> usize {
        self.publish(Change::ChapterIndexes { manga_id, indexes })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
