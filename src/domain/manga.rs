use serde::{Deserialize, Serialize};

use crate::domain::Entity;
use crate::listener::Change;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manga {
    pub id: i64,
    pub source_id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub in_library: bool,
    #[serde(default)]
    pub unread_count: Option<i64>,
    #[serde(default)]
    pub download_count: Option<i64>,
}

impl Manga {
    pub fn new(id: i64, source_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id,
            source_id: source_id.into(),
            title: title.into(),
            thumbnail_url: None,
            in_library: false,
            unread_count: None,
            download_count: None,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}

impl Entity for Manga {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn affected_by(&self, change: &Change) -> bool {
        match change {
            Change::Manga(ids) => ids.contains(&self.id),
            Change::ChapterIds(_) | Change::ChapterIndexes { .. } => false,
        }
    }
}
