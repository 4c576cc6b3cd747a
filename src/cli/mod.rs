pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};

use crate::fetcher::SourceListing;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "A terminal client for a self-hosted manga server", long_about = None)]
pub struct Cli {
    /// Server URL, overriding the config file
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Browse the manga of a source
    Browse {
        /// Source id as reported by the server
        source_id: String,

        /// Which listing to page through
        #[arg(short, long, value_enum, default_value_t = Listing::Popular)]
        listing: Listing,

        /// Search the source instead of listing it
        #[arg(short, long)]
        query: Option<String>,

        /// Number of pages to load
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// Show recently fetched chapters, grouped by day
    Updates {
        /// Number of pages to load
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },
    /// Mark chapters as read (or unread)
    MarkRead {
        manga_id: i64,

        /// Chapter indexes within the manga
        #[arg(required = true)]
        indexes: Vec<i32>,

        /// Mark as unread instead
        #[arg(long)]
        unread: bool,
    },
    /// Add a manga to the library
    Add { manga_id: i64 },
    /// Remove a manga from the library
    Remove { manga_id: i64 },
    /// Print the config file location
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Listing {
    Popular,
    Latest,
}

impl Listing {
    pub fn into_source_listing(self, query: Option<String>) -> SourceListing {
        match (self, query) {
            (_, Some(term)) => SourceListing::Search(term),
            (Listing::Popular, None) => SourceListing::Popular,
            (Listing::Latest, None) => SourceListing::Latest,
        }
    }
}
