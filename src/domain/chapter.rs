use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Dated, Entity, Manga};
use crate::listener::Change;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    pub manga_id: i64,
    /// 1-based position of the chapter within its manga.
    pub index: i32,
    pub name: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default)]
    pub last_page_read: i32,
    #[serde(default)]
    pub page_count: i32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub fetched_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub upload_date: Option<DateTime<Utc>>,
}

impl Chapter {
    pub fn new(id: i64, manga_id: i64, index: i32, fetched_at: DateTime<Utc>) -> Self {
        Self {
            id,
            manga_id,
            index,
            name: format!("Chapter {}", index),
            read: false,
            bookmarked: false,
            last_page_read: 0,
            page_count: 0,
            fetched_at,
            upload_date: None,
        }
    }

    /// Whether this chapter falls under a parent-scoped change for `manga_id`.
    fn in_scope(&self, manga_id: i64, indexes: Option<&[i32]>) -> bool {
        self.manga_id == manga_id && indexes.is_none_or(|indexes| indexes.contains(&self.index))
    }
}

/// One row of the recent-updates feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaAndChapter {
    pub manga: Manga,
    pub chapter: Chapter,
}

impl MangaAndChapter {
    pub fn new(manga: Manga, chapter: Chapter) -> Self {
        Self { manga, chapter }
    }
}

impl Entity for MangaAndChapter {
    type Key = i64;

    fn key(&self) -> i64 {
        self.chapter.id
    }

    fn affected_by(&self, change: &Change) -> bool {
        match change {
            Change::Manga(ids) => ids.contains(&self.manga.id),
            Change::ChapterIds(ids) => ids.contains(&self.chapter.id),
            Change::ChapterIndexes { manga_id, indexes } => {
                self.chapter.in_scope(*manga_id, indexes.as_deref())
            }
        }
    }
}

impl Dated for MangaAndChapter {
    fn timestamp(&self) -> DateTime<Utc> {
        self.chapter.fetched_at
    }
}
