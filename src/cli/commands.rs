use crate::app::{AppContext, Result};
use crate::config::Config;
use crate::domain::{Entity, Manga, MangaAndChapter};
use crate::feed::{Feed, Folder, ViewNode};
use crate::fetcher::{ChapterUpdate, SourceListing};

pub async fn browse(
    ctx: &AppContext,
    source_id: &str,
    listing: SourceListing,
    pages: u32,
) -> Result<()> {
    let feed = ctx.source_feed(source_id, listing);
    load_pages(&feed, pages).await;

    let snapshot = feed.snapshot();
    if snapshot.items.is_empty() {
        println!("No manga");
        return Ok(());
    }

    for manga in &snapshot.items {
        println!("{}", format_manga(manga));
    }
    print_footer(snapshot.page_number, snapshot.has_next_page);

    feed.dispose();
    Ok(())
}

pub async fn updates(ctx: &AppContext, pages: u32) -> Result<()> {
    let feed = ctx.updates_feed();
    load_pages(&feed, pages).await;

    let snapshot = feed.snapshot();
    if snapshot.items.is_empty() {
        println!("No updates");
        return Ok(());
    }

    for node in &snapshot.items {
        println!("{}", format_update(node));
    }
    print_footer(snapshot.page_number, snapshot.has_next_page);

    feed.dispose();
    Ok(())
}

pub async fn mark_read(ctx: &AppContext, manga_id: i64, indexes: &[i32], read: bool) -> Result<()> {
    let update = ChapterUpdate {
        read: Some(read),
        ..ChapterUpdate::default()
    };
    ctx.client.update_chapters(manga_id, indexes, &update).await?;

    let state = if read { "read" } else { "unread" };
    println!("Marked {} chapters of manga {} as {}", indexes.len(), manga_id, state);
    Ok(())
}

pub async fn set_in_library(ctx: &AppContext, manga_id: i64, in_library: bool) -> Result<()> {
    ctx.client.set_in_library(manga_id, in_library).await?;

    if in_library {
        println!("Added manga {} to the library", manga_id);
    } else {
        println!("Removed manga {} from the library", manga_id);
    }
    Ok(())
}

pub fn show_config_path() -> Result<()> {
    let path = Config::default_config_path()?;
    println!("{}", path.display());
    Ok(())
}

/// Loads up to `pages` pages, stopping early when the listing runs out or a
/// page fails.
async fn load_pages<T, F>(feed: &Feed<T, F>, pages: u32)
where
    T: Entity,
    F: Folder<T>,
{
    for _ in 0..pages {
        let before = feed.pager_state().page_number;
        if !feed.load_next_page_and_wait().await {
            break;
        }
        if feed.pager_state().page_number == before {
            eprintln!("Failed to load page {}", before + 1);
            break;
        }
    }
}

fn print_footer(page_number: u32, has_next_page: bool) {
    if has_next_page {
        println!("\n{} pages loaded, more available", page_number);
    } else {
        println!("\n{} pages loaded, end of listing", page_number);
    }
}

fn format_manga(manga: &Manga) -> String {
    let marker = if manga.in_library { "★" } else { " " };
    match manga.unread_count {
        Some(unread) if unread > 0 => {
            format!("{} {:>8}  {} ({} unread)", marker, manga.id, manga.display_title(), unread)
        }
        _ => format!("{} {:>8}  {}", marker, manga.id, manga.display_title()),
    }
}

fn format_update(node: &ViewNode<MangaAndChapter>) -> String {
    match node {
        ViewNode::Header(label) => format!("\n{}", label),
        ViewNode::Entry(update) => {
            let marker = if update.chapter.read { " " } else { "●" };
            let bookmark = if update.chapter.bookmarked { " 🔖" } else { "" };
            format!(
                "{} {} - {}{}",
                marker,
                update.manga.display_title(),
                update.chapter.name,
                bookmark
            )
        }
    }
}
