//! Memory-resident view of the ledger for hot-path lookups

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::app::hash::{ContentHash, PerceptualHash};
use crate::app::models::{AcquisitionKey, ResolutionTier};

/// Identity columns of the durable primary key
pub(crate) type IndexKey = (String, ResolutionTier, String);

pub(crate) fn index_key(key: &AcquisitionKey) -> IndexKey {
    (key.source.clone(), key.tier, key.key_hash())
}

/// Append-only during a run; rebuilt from the database on open
#[derive(Debug, Default)]
pub struct LedgerIndex {
    keys: HashSet<IndexKey>,
    /// Stored artifact paths, linked records included
    paths: HashSet<PathBuf>,
    content: HashMap<ContentHash, PathBuf>,
    perceptual: Vec<(PerceptualHash, PathBuf)>,
}

impl LedgerIndex {
    pub(crate) fn insert(
        &mut self,
        key: IndexKey,
        content_hash: ContentHash,
        perceptual_hash: Option<PerceptualHash>,
        path: PathBuf,
    ) {
        self.keys.insert(key);
        self.paths.insert(path.clone());
        if let Some(phash) = perceptual_hash {
            self.perceptual.push((phash, path.clone()));
        }
        self.content.entry(content_hash).or_insert(path);
    }

    pub fn contains(&self, key: &AcquisitionKey) -> bool {
        self.keys.contains(&index_key(key))
    }

    pub fn holds_path(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn content_path(&self, hash: &ContentHash) -> Option<&PathBuf> {
        self.content.get(hash)
    }

    /// Closest stored fingerprint within `max_distance`
    pub fn nearest_perceptual(
        &self,
        hash: &PerceptualHash,
        max_distance: u32,
    ) -> Option<(PerceptualHash, &PathBuf)> {
        self.perceptual
            .iter()
            .map(|(stored, path)| (stored.distance(hash), *stored, path))
            .filter(|(distance, _, _)| *distance <= max_distance)
            .min_by_key(|(distance, _, _)| *distance)
            .map(|(_, stored, path)| (stored, path))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
