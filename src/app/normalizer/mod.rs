//! Resolution normalization and tier derivation
//!
//! Guarantees that bytes persisted for a tier fit that tier's bounding box.
//! Images that already fit pass through untouched; larger ones are scaled
//! down with Lanczos3 and re-encoded in their original format (JPEG at a
//! fixed high quality). Derivation produces a lower tier from a higher
//! tier's bytes without touching the network.
//!
//! All functions here are CPU bound and synchronous. Async callers run them
//! on the blocking pool.

pub mod resize;
pub mod verify;

pub use resize::{Normalizer, cover_dimensions, fit_dimensions};
pub use verify::{image_dimensions, verify_complete_image};
