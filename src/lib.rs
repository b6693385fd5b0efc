//! Wallpaper Fetcher Library
//!
//! Acquires images from pluggable candidate sources at several resolution
//! tiers. Each artifact is fetched or derived once, deduplicated by content,
//! stored under a deterministic layout with classification mirrors and
//! recorded in a durable ledger, so repeated runs only do new work.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

pub use errors::{AppError, Result};
