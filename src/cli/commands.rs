//! Command handlers for the CLI
//!
//! Each handler resolves the effective configuration first, so invalid
//! settings fail before any network activity.

use std::sync::Arc;

use tracing::{info, warn};

use super::args::{ConfigAction, ConfigArgs, FeedArg, FetchArgs, GlobalArgs};
use super::progress::{ProgressConfig, ProgressDisplay};
use crate::app::acquirer::{Acquirer, RunSummary};
use crate::app::client::Transport;
use crate::app::ledger::Ledger;
use crate::app::models::AcquisitionTask;
use crate::app::scheduler::{SchedulePlan, schedule};
use crate::app::source::{CandidateSource, CollectRequest, FeedLocation, FeedSource, collect_groups};
use crate::app::store::PathLayout;
use crate::app::worker::{WorkerPool, install_shutdown_handler};
use crate::config::AppConfig;
use crate::errors::{AppError, ConfigError, Result};

/// Load the configuration file and apply global flags
pub async fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let mut config = AppConfig::load(global.config.as_deref()).await?;
    global.apply_to(&mut config);
    Ok(config)
}

/// Build one feed source per `--feed`, reading chain declarations up front
pub async fn build_sources(
    feeds: &[FeedArg],
    transport: &Arc<Transport>,
) -> Result<Vec<Arc<dyn CandidateSource>>> {
    let mut sources: Vec<Arc<dyn CandidateSource>> = Vec::with_capacity(feeds.len());
    for (index, feed) in feeds.iter().enumerate() {
        if feeds[..index].iter().any(|other| other.name == feed.name) {
            return Err(ConfigError::invalid(
                "--feed",
                &feed.name,
                "feed names must be unique",
            )
            .into());
        }
        let location = FeedLocation::parse(&feed.location);
        let source = FeedSource::new(feed.name.clone(), location, transport.clone())
            .detect_chain_tiers()
            .await;
        sources.push(Arc::new(source));
    }
    Ok(sources)
}

/// Search the feeds and produce the dispatch order
pub async fn plan_fetch(
    config: &AppConfig,
    args: &FetchArgs,
    transport: &Arc<Transport>,
) -> Result<(Vec<AcquisitionTask>, SchedulePlan)> {
    let sources = build_sources(&args.feeds, transport).await?;
    let request = CollectRequest::new(args.query.clone(), config.tiers()?)
        .with_limit(config.acquisition.limit_per_source);
    let groups = collect_groups(&sources, &request).await;
    Ok(schedule(groups, &config.acquirer_config().aliases))
}

/// Run a fetch with an already merged configuration
///
/// Returns `None` for a dry run.
pub async fn fetch_with_config(config: &AppConfig, args: &FetchArgs) -> Result<Option<RunSummary>> {
    config.validate()?;

    let transport = Arc::new(Transport::with_config(config.transport.clone())?);
    let (tasks, plan) = plan_fetch(config, args, &transport).await?;

    if args.dry_run {
        println!(
            "Dry run: {} tasks from {} groups ({} duplicate URLs dropped)",
            plan.tasks, plan.groups, plan.duplicate_urls
        );
        for (i, task) in tasks.iter().enumerate() {
            println!("  {:>4}. {} {}", i + 1, task.label(), task.item.url);
        }
        return Ok(None);
    }

    let layout = PathLayout::new(&config.storage.root);
    let ledger = Arc::new(Ledger::open(layout.ledger_path())?);
    info!(
        "Ledger at {} holds {} records",
        layout.ledger_path().display(),
        ledger.len()
    );

    let acquirer = Acquirer::new(transport, ledger, layout, config.acquirer_config())
        .with_classifier(config.classifier())
        .with_robots(config.robots())
        .with_normalizer(config.normalizer())
        .with_writer(config.writer());

    let pool = WorkerPool::new(config.workers.clone(), Arc::new(acquirer), tasks);
    let signals = install_shutdown_handler(pool.shutdown_handle());
    let mut progress = ProgressDisplay::new(
        ProgressConfig {
            enabled: !args.no_progress,
        },
        pool.total_tasks(),
    );

    let result = pool.run(|event| progress.handle(event)).await;
    signals.abort();
    progress.finish();
    result.map(Some)
}

pub async fn handle_fetch(global: GlobalArgs, args: FetchArgs) -> Result<()> {
    let mut config = load_config(&global).await?;
    args.apply_to(&mut config);

    let no_progress = args.no_progress || global.quiet;
    let args = FetchArgs {
        no_progress,
        ..args
    };

    if let Some(summary) = fetch_with_config(&config, &args).await? {
        if summary.failed > 0 {
            warn!("{} tier acquisitions failed", summary.failed);
        }
        if !global.quiet {
            println!("\nRun summary:");
            println!("{}", summary);
        }
    }
    Ok(())
}

pub async fn handle_stats(global: GlobalArgs) -> Result<()> {
    let config = load_config(&global).await?;
    let layout = PathLayout::new(&config.storage.root);
    let path = layout.ledger_path();
    if !path.exists() {
        println!("No ledger at {}", path.display());
        return Ok(());
    }

    let ledger = Ledger::open(&path)?;
    let stats = ledger.stats()?;
    println!("Ledger: {}", path.display());
    println!("{}", stats);
    Ok(())
}

pub async fn handle_config(global: GlobalArgs, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = match path.or_else(AppConfig::default_config_path) {
                Some(path) => path,
                None => {
                    return Err(AppError::generic(
                        "Could not determine the user config directory; pass a FILE",
                    ));
                }
            };
            AppConfig::write_default(&path, force).await?;
            println!("Created configuration file {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(&global).await?;
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
