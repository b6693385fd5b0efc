//! Command-line argument parsing for Wallpaper Fetcher
//!
//! Flags given on the command line override the configuration file; the
//! merged configuration is validated before anything touches the network.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::acquirer::{DeriveMode, DupAction, DupMode};
use crate::config::AppConfig;

/// Wallpaper Fetcher - collect wallpapers at several resolutions
#[derive(Parser, Debug)]
#[command(
    name = "wallpaper-fetcher",
    version,
    about = "Fetch, deduplicate and organise wallpapers at several resolutions",
    long_about = "Collects candidate images from JSON feeds, downloads each resolution tier once, \
derives lower tiers locally when possible and records everything in a ledger so re-runs \
only fetch what is new."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - errors only, no progress bar
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output root (overrides storage.root)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect candidates from feeds and acquire every requested tier
    Fetch(FetchArgs),

    /// Show ledger statistics
    Stats,

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// A named feed given as `name=path-or-url`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedArg {
    pub name: String,
    pub location: String,
}

fn parse_feed(value: &str) -> Result<FeedArg, String> {
    let (name, location) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH_OR_URL, got '{}'", value))?;
    let (name, location) = (name.trim(), location.trim());
    if name.is_empty() || location.is_empty() {
        return Err(format!("expected NAME=PATH_OR_URL, got '{}'", value));
    }
    Ok(FeedArg {
        name: name.to_string(),
        location: location.to_string(),
    })
}

#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Feed to search, as NAME=PATH_OR_URL (repeatable)
    #[arg(long = "feed", value_name = "NAME=PATH_OR_URL", value_parser = parse_feed, required = true)]
    pub feeds: Vec<FeedArg>,

    /// Tier to acquire: 4k, 2k, 1k or high, medium, low (repeatable, default all)
    #[arg(short, long = "tier", value_name = "TIER")]
    pub tiers: Vec<String>,

    /// Search query passed to every feed
    #[arg(long, default_value = "")]
    pub query: String,

    /// Candidates per feed and tier
    #[arg(long = "limit-per", value_name = "N")]
    pub limit_per: Option<usize>,

    /// Number of concurrent workers; in-flight permits are lowered to match
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Duplicate detection: url, content or perceptual
    #[arg(long, value_name = "MODE")]
    pub dup_mode: Option<DupMode>,

    /// What to do with a duplicate: skip, link or keep
    #[arg(long, value_name = "ACTION")]
    pub dup_action: Option<DupAction>,

    /// Maximum Hamming distance for perceptual duplicates
    #[arg(long, value_name = "BITS")]
    pub phash_distance: Option<u32>,

    /// Derivation of lower tiers: prefer, fallback or off
    #[arg(long = "derive", value_name = "MODE")]
    pub derive_mode: Option<DeriveMode>,

    /// Crop to the exact tier size instead of fitting inside it
    #[arg(long)]
    pub exact: bool,

    /// Download in one request instead of resuming through staging files
    #[arg(long)]
    pub no_resume: bool,

    /// Show the scheduled tasks without acquiring anything
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Destination (default: the per-user config file)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level for this crate's targets
    pub fn log_level(&self) -> tracing::Level {
        self.global.log_level()
    }
}

impl GlobalArgs {
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.very_verbose {
            tracing::Level::DEBUG
        } else if self.verbose {
            tracing::Level::INFO
        } else {
            tracing::Level::WARN
        }
    }

    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(root) = &self.root {
            config.storage.root = root.clone();
        }
    }
}

impl FetchArgs {
    /// Override configuration values with the flags that were given
    pub fn apply_to(&self, config: &mut AppConfig) {
        let acquisition = &mut config.acquisition;
        if !self.tiers.is_empty() {
            acquisition.tiers = self.tiers.clone();
        }
        if let Some(limit) = self.limit_per {
            acquisition.limit_per_source = limit;
        }
        if let Some(mode) = self.dup_mode {
            acquisition.dup_mode = mode;
        }
        if let Some(action) = self.dup_action {
            acquisition.dup_action = action;
        }
        if let Some(distance) = self.phash_distance {
            acquisition.phash_distance = distance;
        }
        if let Some(mode) = self.derive_mode {
            acquisition.derive_mode = mode;
        }
        if self.exact {
            acquisition.exact = true;
        }
        if self.no_resume {
            acquisition.resumable = false;
        }
        if let Some(workers) = self.workers {
            config.workers.worker_count = workers;
            config.transport.max_in_flight = config.transport.max_in_flight.min(workers);
        }
    }
}
