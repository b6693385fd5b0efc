//! Durable, idempotent record of everything already acquired
//!
//! The ledger maps an [`AcquisitionKey`](crate::app::models::AcquisitionKey)
//! to the stored artifact's metadata. It is the single source of truth for
//! "have we already got this" and backs all three dedup levels:
//!
//! - **Key**: `exists` answers from an in-memory index loaded at startup
//! - **Content**: `content_hash_seen` / `find_by_content_hash`
//! - **Perceptual**: `perceptual_match` scans stored difference hashes
//!
//! Writes are append-or-ignore and serialized behind one connection lock.
//! The only in-place change ever made is filling in missing cache
//! validators.
//!
//! # Examples
//!
//! ```rust,no_run
//! use wallpaper_fetcher::app::ledger::Ledger;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Ledger::open("wallpapers/ledger.sqlite3")?;
//! println!("{} artifacts recorded", ledger.len());
//! # Ok(())
//! # }
//! ```

pub mod index;
pub mod schema;
pub mod sqlite;
pub mod stats;

#[cfg(test)]
mod tests;

pub use schema::SCHEMA_VERSION;
pub use sqlite::Ledger;
pub use stats::LedgerStats;
