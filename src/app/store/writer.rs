//! Primary-once writes and mirror replication

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::constants::files;
use crate::errors::{StoreError, StoreResult};

/// How one mirror path was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorMethod {
    Existing,
    HardLink,
    Copy,
}

/// Result of one `save` or `link_mirrors` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    /// Whether the primary was written by this call
    pub primary_written: bool,
    /// Bytes written to the primary
    pub bytes_written: u64,
    pub mirrors: Vec<(PathBuf, MirrorMethod)>,
}

impl SaveReport {
    pub fn mirrors_created(&self) -> usize {
        self.mirrors
            .iter()
            .filter(|(_, method)| *method != MirrorMethod::Existing)
            .count()
    }
}

async fn ensure_dir(dir: &Path) -> StoreResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| StoreError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

async fn ensure_parent(path: &Path) -> StoreResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent).await,
        _ => Ok(()),
    }
}

/// Whether `path` is a non-empty regular file
pub async fn is_present(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(files::TEMP_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Writes primaries exactly once and replicates them into mirror locations
///
/// Mirrors are hard links when the filesystem allows it, otherwise copies of
/// the primary as it exists on disk.
#[derive(Debug, Clone, Copy)]
pub struct MirrorWriter {
    hard_links: bool,
}

impl Default for MirrorWriter {
    fn default() -> Self {
        Self { hard_links: true }
    }
}

impl MirrorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable hard links, e.g. for filesystems that reject them
    pub fn with_hard_links(mut self, enabled: bool) -> Self {
        self.hard_links = enabled;
        self
    }

    /// Write `bytes` to `primary` unless a non-empty file is already there,
    /// then materialize every mirror
    ///
    /// A crash between primary and mirrors is repaired by calling this again.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if a directory, the primary or a mirror cannot
    /// be created.
    pub async fn save(
        &self,
        bytes: &[u8],
        primary: &Path,
        mirrors: &[PathBuf],
    ) -> StoreResult<SaveReport> {
        ensure_parent(primary).await?;

        let mut report = SaveReport::default();
        if is_present(primary).await {
            debug!("Primary already present, not overwriting: {}", primary.display());
        } else {
            self.write_atomic(bytes, primary).await?;
            report.primary_written = true;
            report.bytes_written = bytes.len() as u64;
            info!("Saved {}", primary.display());
        }

        report.mirrors = self.replicate(primary, mirrors).await?;
        Ok(report)
    }

    /// Mirror an already-stored artifact under additional paths
    pub async fn link_mirrors(&self, primary: &Path, mirrors: &[PathBuf]) -> StoreResult<SaveReport> {
        Ok(SaveReport {
            mirrors: self.replicate(primary, mirrors).await?,
            ..Default::default()
        })
    }

    async fn write_atomic(&self, bytes: &[u8], path: &Path) -> StoreResult<()> {
        let temp_path = temp_path_for(path);
        fs::write(&temp_path, bytes)
            .await
            .map_err(|source| StoreError::WritePrimary {
                path: path.to_path_buf(),
                source,
            })?;
        if fs::rename(&temp_path, path).await.is_err() {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::AtomicOperationFailed {
                temp_path,
                final_path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    async fn replicate(
        &self,
        primary: &Path,
        mirrors: &[PathBuf],
    ) -> StoreResult<Vec<(PathBuf, MirrorMethod)>> {
        let mut results = Vec::with_capacity(mirrors.len());
        for mirror in mirrors {
            if mirror == primary {
                continue;
            }
            let method = self.mirror_one(primary, mirror).await?;
            results.push((mirror.clone(), method));
        }
        Ok(results)
    }

    async fn mirror_one(&self, primary: &Path, mirror: &Path) -> StoreResult<MirrorMethod> {
        ensure_parent(mirror).await?;
        if fs::symlink_metadata(mirror).await.is_ok() {
            debug!("Mirror exists: {}", mirror.display());
            return Ok(MirrorMethod::Existing);
        }

        if self.hard_links {
            match fs::hard_link(primary, mirror).await {
                Ok(()) => {
                    debug!("Hard-linked mirror {}", mirror.display());
                    return Ok(MirrorMethod::HardLink);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    return Ok(MirrorMethod::Existing)
                }
                Err(e) => debug!("Hard link to {} failed ({}), copying", mirror.display(), e),
            }
        }

        // Copy what the primary holds, which may predate this call's bytes
        fs::copy(primary, mirror).await.map_err(|source| StoreError::Mirror {
            primary: primary.to_path_buf(),
            mirror: mirror.to_path_buf(),
            source,
        })?;
        debug!("Copied mirror {}", mirror.display());
        Ok(MirrorMethod::Copy)
    }
}
