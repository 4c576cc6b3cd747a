use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use crate::app::{FolioError, Result};
use crate::config::ServerConfig;
use crate::domain::{Chapter, Manga, MangaAndChapter, Page};
use crate::fetcher::{PageFetcher, Refetcher};
use crate::listener::ChangeBus;

/// Which listing of a source to page through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceListing {
    Popular,
    Latest,
    Search(String),
}

/// Field updates for a single chapter. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct ChapterUpdate {
    pub read: Option<bool>,
    pub bookmarked: Option<bool>,
    pub last_page_read: Option<i32>,
}

impl ChapterUpdate {
    fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = Vec::new();
        if let Some(read) = self.read {
            form.push(("read", read.to_string()));
        }
        if let Some(bookmarked) = self.bookmarked {
            form.push(("bookmarked", bookmarked.to_string()));
        }
        if let Some(page) = self.last_page_read {
            form.push(("lastPageRead", page.to_string()));
        }
        form
    }
}

/// JSON client for the manga server's REST API.
///
/// Mutations publish a change on the bus once the server has accepted them,
/// so every open feed showing the entity picks up the new state.
pub struct ServerClient {
    client: Client,
    base: Url,
    bus: ChangeBus,
}

impl ServerClient {
    pub fn new(config: &ServerConfig, bus: ChangeBus) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base: Url::parse(&config.url)?,
            bus,
        })
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub async fn source_page(
        &self,
        source_id: &str,
        listing: &SourceListing,
        page: u32,
    ) -> Result<Page<Manga>> {
        let page_str = page.to_string();
        let url = match listing {
            SourceListing::Popular => {
                self.endpoint(&["api", "v1", "source", source_id, "popular", &page_str])?
            }
            SourceListing::Latest => {
                self.endpoint(&["api", "v1", "source", source_id, "latest", &page_str])?
            }
            SourceListing::Search(term) => {
                let mut url = self.endpoint(&["api", "v1", "source", source_id, "search"])?;
                url.query_pairs_mut()
                    .append_pair("searchTerm", term)
                    .append_pair("pageNum", &page_str);
                url
            }
        };
        self.get_json(url).await
    }

    pub async fn recent_chapters(&self, page: u32) -> Result<Page<MangaAndChapter>> {
        let url = self.endpoint(&["api", "v1", "update", "recentChapters", &page.to_string()])?;
        self.get_json(url).await
    }

    pub async fn manga(&self, id: i64) -> Result<Manga> {
        let url = self.endpoint(&["api", "v1", "manga", &id.to_string()])?;
        self.get_json(url).await
    }

    pub async fn chapter(&self, manga_id: i64, index: i32) -> Result<Chapter> {
        let url = self.endpoint(&[
            "api",
            "v1",
            "manga",
            &manga_id.to_string(),
            "chapter",
            &index.to_string(),
        ])?;
        self.get_json(url).await
    }

    pub async fn update_chapters(
        &self,
        manga_id: i64,
        indexes: &[i32],
        update: &ChapterUpdate,
    ) -> Result<()> {
        let form = update.form();
        if form.is_empty() || indexes.is_empty() {
            return Ok(());
        }

        let mut patched = Vec::with_capacity(indexes.len());
        let mut outcome = Ok(());
        for &index in indexes {
            if let Err(e) = self.patch_chapter(manga_id, index, &form).await {
                outcome = Err(e);
                break;
            }
            patched.push(index);
        }

        // Chapters the server already accepted are stale on screen even when a
        // later one failed.
        if !patched.is_empty() {
            self.bus.chapter_indexes_changed(manga_id, Some(patched));
        }
        outcome
    }

    async fn patch_chapter(
        &self,
        manga_id: i64,
        index: i32,
        form: &[(&'static str, String)],
    ) -> Result<()> {
        let url = self.endpoint(&[
            "api",
            "v1",
            "manga",
            &manga_id.to_string(),
            "chapter",
            &index.to_string(),
        ])?;
        self.send(self.client.request(Method::PATCH, url).form(form))
            .await?;
        Ok(())
    }

    pub async fn set_in_library(&self, manga_id: i64, in_library: bool) -> Result<()> {
        let url = self.endpoint(&["api", "v1", "manga", &manga_id.to_string(), "library"])?;
        let method = if in_library {
            Method::GET
        } else {
            Method::DELETE
        };
        self.send(self.client.request(method, url)).await?;

        self.bus.manga_changed(vec![manga_id]);
        // Library membership shows up on every chapter row of the manga too.
        self.bus.chapter_indexes_changed(manga_id, None);
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| FolioError::Other(format!("Server URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let body = self.send(self.client.get(url)).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FolioError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Pages through one listing of one source.
pub struct SourceFeedFetcher {
    client: Arc<ServerClient>,
    source_id: String,
    listing: SourceListing,
}

impl SourceFeedFetcher {
    pub fn new(client: Arc<ServerClient>, source_id: String, listing: SourceListing) -> Self {
        Self {
            client,
            source_id,
            listing,
        }
    }
}

#[async_trait]
impl PageFetcher<Manga> for SourceFeedFetcher {
    async fn fetch_page(&self, page: u32) -> Option<Page<Manga>> {
        match self
            .client
            .source_page(&self.source_id, &self.listing, page)
            .await
        {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!(
                    "Failed to load page {} of source {}: {}",
                    page,
                    self.source_id,
                    e
                );
                None
            }
        }
    }
}

/// Pages through the recently fetched chapters across the library.
pub struct UpdatesFetcher {
    client: Arc<ServerClient>,
}

impl UpdatesFetcher {
    pub fn new(client: Arc<ServerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher<MangaAndChapter> for UpdatesFetcher {
    async fn fetch_page(&self, page: u32) -> Option<Page<MangaAndChapter>> {
        match self.client.recent_chapters(page).await {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!("Failed to load updates page {}: {}", page, e);
                None
            }
        }
    }
}

pub struct MangaRefetcher {
    client: Arc<ServerClient>,
}

impl MangaRefetcher {
    pub fn new(client: Arc<ServerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Refetcher<Manga> for MangaRefetcher {
    async fn refetch(&self, current: &Manga) -> Option<Manga> {
        match self.client.manga(current.id).await {
            Ok(manga) => Some(manga),
            Err(e) => {
                tracing::warn!("Failed to refresh manga {}: {}", current.id, e);
                None
            }
        }
    }
}

/// Refreshes an updates row by its `(manga_id, index)` address.
pub struct UpdateRefetcher {
    client: Arc<ServerClient>,
}

impl UpdateRefetcher {
    pub fn new(client: Arc<ServerClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Refetcher<MangaAndChapter> for UpdateRefetcher {
    async fn refetch(&self, current: &MangaAndChapter) -> Option<MangaAndChapter> {
        let manga_id = current.manga.id;
        let index = current.chapter.index;

        let result = tokio::try_join!(
            self.client.manga(manga_id),
            self.client.chapter(manga_id, index)
        );

        match result {
            Ok((manga, chapter)) => Some(MangaAndChapter::new(manga, chapter)),
            Err(e) => {
                tracing::warn!(
                    "Failed to refresh chapter {} of manga {}: {}",
                    index,
                    manga_id,
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;
    use crate::listener::Change;

    fn client(url: &str) -> ServerClient {
        let config = ServerConfig {
            url: url.to_string(),
            ..ServerConfig::default()
        };
        ServerClient::new(&config, ChangeBus::new()).unwrap()
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = client("http://127.0.0.1:4567");
        let url = client.endpoint(&["api", "v1", "manga", "42"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4567/api/v1/manga/42");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = client("https://example.com/suwayomi/");
        let url = client
            .endpoint(&["api", "v1", "update", "recentChapters", "1"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/suwayomi/api/v1/update/recentChapters/1"
        );
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = client("http://localhost:4567");
        let url = client.endpoint(&["api", "v1", "source", "a b"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4567/api/v1/source/a%20b");
    }

    #[test]
    fn test_invalid_server_url() {
        let config = ServerConfig {
            url: "not a url".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            ServerClient::new(&config, ChangeBus::new()),
            Err(FolioError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_chapter_update_form() {
        let update = ChapterUpdate {
            read: Some(true),
            last_page_read: Some(4),
            ..ChapterUpdate::default()
        };
        assert_eq!(
            update.form(),
            vec![("read", "true".to_string()), ("lastPageRead", "4".to_string())]
        );
        assert!(ChapterUpdate::default().form().is_empty());
    }

    /// Answers each incoming request with the next status, one connection
    /// per request.
    async fn serve(statuses: Vec<u16>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {} Status\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{}", addr)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&request).to_lowercase();
            if let Some(end) = text.find("\r\n\r\n") {
                let body_len = text[..end]
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|len| len.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    fn mark_read() -> ChapterUpdate {
        ChapterUpdate {
            read: Some(true),
            ..ChapterUpdate::default()
        }
    }

    #[tokio::test]
    async fn test_update_publishes_every_patched_index() {
        let client = client(&serve(vec![200, 200]).await);
        let mut rx = client.bus().subscribe();

        client.update_chapters(1, &[1, 2], &mark_read()).await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            Change::ChapterIndexes {
                manga_id: 1,
                indexes: Some(vec![1, 2]),
            }
        );
    }

    #[tokio::test]
    async fn test_partial_update_publishes_accepted_indexes() {
        let client = client(&serve(vec![200, 500]).await);
        let mut rx = client.bus().subscribe();

        let result = client.update_chapters(1, &[1, 2, 3], &mark_read()).await;

        assert!(matches!(result, Err(FolioError::Status { status: 500, .. })));
        assert_eq!(
            rx.try_recv().unwrap(),
            Change::ChapterIndexes {
                manga_id: 1,
                indexes: Some(vec![1]),
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_first_update_publishes_nothing() {
        let client = client(&serve(vec![404]).await);
        let mut rx = client.bus().subscribe();

        let result = client.update_chapters(1, &[1, 2], &mark_read()).await;

        assert!(matches!(result, Err(FolioError::Status { status: 404, .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_update_publishes_nothing() {
        let client = client("http://127.0.0.1:9");
        let mut rx = client.bus().subscribe();
        client
            .update_chapters(1, &[1, 2], &ChapterUpdate::default())
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
