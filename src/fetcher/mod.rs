pub mod http_fetcher;

use async_trait::async_trait;

use crate::domain::Page;

pub use http_fetcher::{
    ChapterUpdate, MangaRefetcher, ServerClient, SourceFeedFetcher, SourceListing,
    UpdateRefetcher, UpdatesFetcher,
};

/// Loads one page of a listing.
///
/// `None` means the attempt failed and was already reported; the pager keeps
/// its position and the same page is requested again on the next call. An
/// empty `Page` is a successful, empty result.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Option<Page<T>>;
}

/// Pulls the fresh value of a single displayed entity.
///
/// Receives the snapshot currently on screen, which carries the id and any
/// composite addressing the server needs. `None` keeps the stale value.
#[async_trait]
pub trait Refetcher<T>: Send + Sync {
    async fn refetch(&self, current: &T) -> Option<T>;
}
