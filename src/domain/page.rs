use serde::Deserialize;

/// One page of a paginated listing.
///
/// Source listings name the item array `mangaList`, the updates listing names
/// it `page`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(rename = "items", alias = "mangaList", alias = "page")]
    pub items: Vec<T>,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_next_page: bool) -> Self {
        Self {
            items,
            has_next_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Manga;

    #[test]
    fn test_source_listing_shape() {
        let json = r#"{"mangaList":[{"id":1,"sourceId":"7","title":"A"}],"hasNextPage":true}"#;
        let page: Page<Manga> = serde_json::from_str(json).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_next_page);
    }

    #[test]
    fn test_updates_listing_shape() {
        let json = r#"{"page":[],"hasNextPage":false}"#;
        let page: Page<Manga> = serde_json::from_str(json).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_next_page);
    }
}
