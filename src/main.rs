use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use folio::app::AppContext;
use folio::cli::{commands, Cli, Commands};
use folio::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        commands::show_config_path()?;
        return Ok(());
    }

    let mut config = Config::load()?;
    if let Some(server) = cli.server {
        config.server.url = server;
    }
    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Browse {
            source_id,
            listing,
            query,
            pages,
        } => {
            let listing = listing.into_source_listing(query);
            commands::browse(&ctx, &source_id, listing, pages).await?;
        }
        Commands::Updates { pages } => {
            commands::updates(&ctx, pages).await?;
        }
        Commands::MarkRead {
            manga_id,
            indexes,
            unread,
        } => {
            commands::mark_read(&ctx, manga_id, &indexes, !unread).await?;
        }
        Commands::Add { manga_id } => {
            commands::set_in_library(&ctx, manga_id, true).await?;
        }
        Commands::Remove { manga_id } => {
            commands::set_in_library(&ctx, manga_id, false).await?;
        }
        Commands::Config => {}
    }

    ctx.shutdown();
    Ok(())
}
