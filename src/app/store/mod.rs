//! Persistence of acquired artifacts
//!
//! - `path`: deterministic primary, mirror and staging locations
//! - `classify`: keyword labels that select mirror directories
//! - `writer`: write-once primaries with hard-link (or copy) mirrors

pub mod classify;
pub mod path;
pub mod writer;


pub use classify::KeywordClassifier;
pub use path::{PathLayout, extension_for, safe_filename};
pub use writer::{MirrorMethod, MirrorWriter, SaveReport, is_present};
