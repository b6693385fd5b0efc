//! Wallpaper Fetcher CLI application
//!
//! Collects wallpapers from JSON feeds at several resolutions, deduplicating
//! against a persistent ledger.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use wallpaper_fetcher::cli::{Cli, Commands, handle_config, handle_fetch, handle_stats};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();
    init_logging(&cli)?;

    info!("Wallpaper Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Fetch(args) => handle_fetch(cli.global, args)
            .await
            .context("fetch failed")?,
        Commands::Stats => handle_stats(cli.global)
            .await
            .context("could not read ledger statistics")?,
        Commands::Config(args) => handle_config(cli.global, args)
            .await
            .context("configuration command failed")?,
    }
    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let directive = format!("wallpaper_fetcher={}", cli.log_level())
        .parse()
        .context("invalid log directive")?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose)
        .with_writer(std::io::stderr)
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    }
    Ok(())
}
