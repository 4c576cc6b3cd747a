//! # Folio
//!
//! A terminal client for a self-hosted manga server.
//!
//! ## Architecture
//!
//! ```text
//! PageFetcher → Pager → Folder ─┐
//!                               ├→ Compositor → FeedSnapshot
//! ChangeBus → Reconciler ───────┘
//! ```
//!
//! - [`feed`]: incremental, single-flight paging with live reconciliation
//! - [`listener`]: process-wide change notifications
//! - [`fetcher`]: page/refetch contracts and the HTTP adapter
//! - [`domain`]: manga, chapters and pages
//!
//! ## Quick Start
//!
//! ```bash
//! # Browse a source
//! folio browse 2499283573021220255 --pages 2
//!
//! # Recently fetched chapters
//! folio updates
//!
//! # Mark chapters read
//! folio mark-read 42 1 2 3
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the server
/// client, the change bus and the feeds created from them.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/folio/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Manga`](domain::Manga): item of a source listing
/// - [`MangaAndChapter`](domain::MangaAndChapter): item of the updates listing
/// - [`Page`](domain::Page): one page of a listing
pub mod domain;

/// Paged feeds kept fresh by change notifications.
pub mod feed;

/// Collaborator contracts and the reqwest-based server client.
///
/// - [`PageFetcher`](fetcher::PageFetcher): loads one page of a listing
/// - [`Refetcher`](fetcher::Refetcher): reloads one displayed entity
/// - [`ServerClient`](fetcher::ServerClient): REST client
pub mod fetcher;

/// Change notifications fanned out to every open feed.
pub mod listener;
