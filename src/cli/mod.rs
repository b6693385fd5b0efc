//! Command-line interface components
//!
//! Argument parsing, command handlers and the progress display of the
//! `wallpaper-fetcher` binary.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Cli, Commands, ConfigAction, ConfigArgs, FeedArg, FetchArgs, GlobalArgs};
pub use commands::{fetch_with_config, handle_config, handle_fetch, handle_stats, load_config};
pub use progress::{ProgressConfig, ProgressDisplay};
