pub mod chapter;
pub mod manga;
pub mod page;

use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};

use crate::listener::Change;

pub use chapter::{Chapter, MangaAndChapter};
pub use manga::Manga;
pub use page::Page;

/// An immutable snapshot with a stable identity.
///
/// Updates always produce a new value; feeds swap snapshots by key.
pub trait Entity: Clone + Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    /// Whether a change notification concerns this snapshot.
    fn affected_by(&self, change: &Change) -> bool;
}

/// Items that can be grouped under date headers.
pub trait Dated {
    fn timestamp(&self) -> DateTime<Utc>;
}
