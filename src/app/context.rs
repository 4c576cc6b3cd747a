use std::sync::Arc;

use crate::app::Result;
use crate::config::Config;
use crate::domain::{Manga, MangaAndChapter};
use crate::feed::{DateFolder, FeedBuilder, GroupedFeed, PlainFeed, Scope};
use crate::fetcher::{
    MangaRefetcher, ServerClient, SourceFeedFetcher, SourceListing, UpdateRefetcher,
    UpdatesFetcher,
};
use crate::listener::ChangeBus;

pub struct AppContext {
    pub config: Config,
    pub bus: ChangeBus,
    pub client: Arc<ServerClient>,
    scope: Scope,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let bus = ChangeBus::with_capacity(config.feeds.bus_capacity);
        let client = Arc::new(ServerClient::new(&config.server, bus.clone())?);

        Ok(Self {
            config,
            bus,
            client,
            scope: Scope::new(),
        })
    }

    /// Context built from the config file at the default location.
    pub fn load() -> Result<Self> {
        Self::new(Config::load()?)
    }

    /// A fresh browsing session over one listing of a source.
    pub fn source_feed(&self, source_id: &str, listing: SourceListing) -> PlainFeed<Manga> {
        let fetcher = SourceFeedFetcher::new(self.client.clone(), source_id.to_string(), listing);
        FeedBuilder::new(
            Arc::new(fetcher),
            Arc::new(MangaRefetcher::new(self.client.clone())),
        )
        .changes(self.bus.subscribe())
        .refetch_concurrency(self.config.feeds.refetch_concurrency)
        .scope(self.scope.clone())
        .plain()
    }

    /// A fresh session over recently fetched chapters, grouped by day.
    pub fn updates_feed(&self) -> GroupedFeed<MangaAndChapter> {
        let folder = DateFolder::new(
            self.config.feeds.utc_offset(),
            &self.config.feeds.date_format,
        );
        FeedBuilder::new(
            Arc::new(UpdatesFetcher::new(self.client.clone())),
            Arc::new(UpdateRefetcher::new(self.client.clone())),
        )
        .changes(self.bus.subscribe())
        .refetch_concurrency(self.config.feeds.refetch_concurrency)
        .scope(self.scope.clone())
        .grouped(folder)
    }

    /// Cancels the background work of every feed created from this context.
    pub fn shutdown(&self) {
        self.scope.cancel();
    }
}
