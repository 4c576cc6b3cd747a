//! Turning fetched batches into display nodes.

use std::fmt::Debug;

use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, NaiveDate, Offset, Utc};

use crate::domain::{Dated, Entity};
use crate::feed::compositor::PatchMap;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Folds each fetched batch into display nodes, carrying whatever state it
/// needs from one batch to the next.
pub trait Folder<T: Entity>: Send + 'static {
    type Node: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Nodes for a newly fetched batch. Called once per page, in page order.
    fn fold(&mut self, batch: &[T]) -> Vec<Self::Node>;

    /// `node` with its item replaced by the patched value, if there is one.
    fn patch(node: &Self::Node, patches: &PatchMap<T>) -> Self::Node;
}

/// One node per item, no grouping.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flat;

impl<T> Folder<T> for Flat
where
    T: Entity + Debug + PartialEq,
{
    type Node = T;

    fn fold(&mut self, batch: &[T]) -> Vec<T> {
        batch.to_vec()
    }

    fn patch(node: &T, patches: &PatchMap<T>) -> T {
        patches.resolve(node).clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode<T> {
    Header(String),
    Entry(T),
}

impl<T> ViewNode<T> {
    pub fn item(&self) -> Option<&T> {
        match self {
            ViewNode::Header(_) => None,
            ViewNode::Entry(item) => Some(item),
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, ViewNode::Header(_))
    }
}

/// Groups newest-first items under a header per calendar day.
///
/// Only the date of the last emitted entry survives between batches, so each
/// page is folded in time proportional to its own length.
#[derive(Debug, Clone)]
pub struct DateFolder {
    offset: FixedOffset,
    format: String,
    last_date: Option<NaiveDate>,
}

impl DateFolder {
    /// `format` is a strftime pattern; an invalid one falls back to `%Y-%m-%d`.
    pub fn new(offset: FixedOffset, format: &str) -> Self {
        let valid = !StrftimeItems::new(format).any(|item| matches!(item, Item::Error));
        let format = if valid {
            format.to_string()
        } else {
            tracing::warn!(
                "Invalid date format {:?}, using {}",
                format,
                DEFAULT_DATE_FORMAT
            );
            DEFAULT_DATE_FORMAT.to_string()
        };

        Self {
            offset,
            format,
            last_date: None,
        }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix(), DEFAULT_DATE_FORMAT)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    fn label(&self, date: NaiveDate) -> String {
        date.format(&self.format).to_string()
    }
}

impl<T> Folder<T> for DateFolder
where
    T: Entity + Dated + Debug + PartialEq,
{
    type Node = ViewNode<T>;

    fn fold(&mut self, batch: &[T]) -> Vec<ViewNode<T>> {
        let mut nodes = Vec::with_capacity(batch.len() + 1);

        for item in batch {
            let date = item.timestamp().with_timezone(&self.offset).date_naive();
            if self.last_date != Some(date) {
                nodes.push(ViewNode::Header(self.label(date)));
                self.last_date = Some(date);
            }
            nodes.push(ViewNode::Entry(item.clone()));
        }

        nodes
    }

    fn patch(node: &ViewNode<T>, patches: &PatchMap<T>) -> ViewNode<T> {
        match node {
            ViewNode::Header(label) => ViewNode::Header(label.clone()),
            ViewNode::Entry(item) => ViewNode::Entry(patches.resolve(item).clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone};

    use super::*;
    use crate::listener::Change;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: i64,
        at: DateTime<Utc>,
    }

    impl Entity for Row {
        type Key = i64;

        fn key(&self) -> i64 {
            self.id
        }

        fn affected_by(&self, _change: &Change) -> bool {
            false
        }
    }

    impl Dated for Row {
        fn timestamp(&self) -> DateTime<Utc> {
            self.at
        }
    }

    fn row(id: i64, day: u32, hour: u32) -> Row {
        Row {
            id,
            at: Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap(),
        }
    }

    fn header(label: &str) -> ViewNode<Row> {
        ViewNode::Header(label.to_string())
    }

    #[test]
    fn test_groups_single_page_by_day() {
        let mut folder = DateFolder::utc();
        let batch = vec![row(1, 2, 18), row(2, 2, 9), row(3, 1, 20)];

        let nodes = folder.fold(&batch);

        assert_eq!(
            nodes,
            vec![
                header("2024-01-02"),
                ViewNode::Entry(batch[0].clone()),
                ViewNode::Entry(batch[1].clone()),
                header("2024-01-01"),
                ViewNode::Entry(batch[2].clone()),
            ]
        );
    }

    #[test]
    fn test_same_day_continues_across_pages() {
        let mut folder = DateFolder::utc();
        let first = folder.fold(&[row(1, 2, 18)]);
        let second = folder.fold(&[row(2, 2, 9), row(3, 1, 20)]);

        assert_eq!(first.len(), 2);
        assert_eq!(
            second,
            vec![
                ViewNode::Entry(row(2, 2, 9)),
                header("2024-01-01"),
                ViewNode::Entry(row(3, 1, 20)),
            ]
        );
    }

    #[test]
    fn test_new_day_on_page_boundary_gets_header() {
        let mut folder = DateFolder::utc();
        folder.fold(&[row(1, 3, 1)]);
        let second = folder.fold(&[row(2, 2, 23)]);
        assert_eq!(second[0], header("2024-01-02"));
    }

    #[test]
    fn test_empty_batch_emits_nothing() {
        let mut folder = DateFolder::utc();
        assert!(Folder::<Row>::fold(&mut folder, &[]).is_empty());
        assert_eq!(folder.last_date(), None);

        // An empty page in the middle keeps the running date.
        folder.fold(&[row(1, 2, 12)]);
        assert!(Folder::<Row>::fold(&mut folder, &[]).is_empty());
        assert_eq!(folder.fold(&[row(2, 2, 8)]), vec![ViewNode::Entry(row(2, 2, 8))]);
    }

    #[test]
    fn test_offset_moves_day_boundary() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let mut folder = DateFolder::new(tokyo, "%Y-%m-%d");
        // 20:00 UTC on the 1st is already the 2nd in Tokyo.
        let nodes = folder.fold(&[row(1, 1, 20)]);
        assert_eq!(nodes[0], header("2024-01-02"));
    }

    #[test]
    fn test_custom_and_invalid_formats() {
        let utc = FixedOffset::east_opt(0).unwrap();

        let mut custom = DateFolder::new(utc, "%d %b %Y");
        assert_eq!(custom.fold(&[row(1, 2, 0)])[0], header("02 Jan 2024"));

        let mut invalid = DateFolder::new(utc, "%Q");
        assert_eq!(invalid.fold(&[row(1, 2, 0)])[0], header("2024-01-02"));
    }

    #[test]
    fn test_flat_passes_items_through() {
        let mut flat = Flat;
        let batch = vec![row(1, 1, 0), row(2, 1, 0)];
        assert_eq!(flat.fold(&batch), batch);
    }

    #[test]
    fn test_patch_replaces_entries_only() {
        let mut patches = PatchMap::new();
        let mut updated = row(2, 2, 9);
        updated.at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        patches.insert(updated.clone());

        let head = header("2024-01-02");
        assert_eq!(DateFolder::patch(&head, &patches), head);
        assert_eq!(
            DateFolder::patch(&ViewNode::Entry(row(2, 2, 9)), &patches),
            ViewNode::Entry(updated)
        );
        assert_eq!(
            DateFolder::patch(&ViewNode::Entry(row(1, 2, 9)), &patches),
            ViewNode::Entry(row(1, 2, 9))
        );
    }
}
