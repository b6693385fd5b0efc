//! Per-item acquisition state machine
//!
//! For every tier of a task, highest fidelity first:
//!
//! 1. Identity check against the ledger and the primary path on disk
//! 2. Derivation from resident higher-tier bytes (`DeriveMode::Prefer`)
//! 3. Candidate URLs tried in order: probe unless archival, then fetch
//! 4. Derivation after every URL failed (`DeriveMode::Fallback`)
//! 5. Normalization into the tier's bounding box
//! 6. Content/perceptual dedup, persist with mirrors, ledger commit
//!
//! A tier's failure is reported in its [`TierOutcome`] and never stops the
//! remaining tiers or other items.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::client::{ProbeOutcome, ResumableOutcome, Transport};
use crate::app::hash::{ContentHash, PerceptualHash};
use crate::app::ledger::Ledger;
use crate::app::models::{
    AcquisitionKey, AcquisitionTask, CacheValidators, CandidateItem, LedgerRecord, ResolutionTier,
};
use crate::app::normalizer::{Normalizer, image_dimensions, verify_complete_image};
use crate::app::source::{AllowAll, RobotsGate};
use crate::app::store::{KeywordClassifier, MirrorWriter, PathLayout, is_present};
use crate::errors::{AppError, TransferError};

pub mod candidates;
pub mod config;
pub mod outcome;
pub mod stats;

#[cfg(test)]
mod tests;

pub use candidates::{candidate_urls, swap_suffix};
pub use config::{AcquirerConfig, DeriveMode, DupAction, DupMode};
pub use outcome::{ItemReport, TierOutcome};
pub use stats::RunSummary;

/// Highest-fidelity bytes of the current item held for derivation
struct Resident {
    tier: ResolutionTier,
    bytes: Arc<Vec<u8>>,
}

/// Bytes ready to be deduplicated and persisted for one tier
struct Prepared {
    bytes: Vec<u8>,
    url: String,
    validators: CacheValidators,
    derived_from: Option<ResolutionTier>,
}

struct Fingerprint {
    bytes: Vec<u8>,
    content_hash: ContentHash,
    perceptual_hash: Option<PerceptualHash>,
    dimensions: Option<(u32, u32)>,
}

enum FetchResult {
    Fetched {
        url: Url,
        bytes: Vec<u8>,
        validators: CacheValidators,
    },
    NotModified(Url),
    Missed(String),
}

fn task_failed(what: &str, error: tokio::task::JoinError) -> AppError {
    AppError::generic(format!("{} task failed: {}", what, error))
}

async fn fingerprint(bytes: Vec<u8>, perceptual: bool) -> Result<Fingerprint, AppError> {
    tokio::task::spawn_blocking(move || {
        let content_hash = ContentHash::of(&bytes);
        let dimensions = image_dimensions(&bytes);
        let perceptual_hash = if perceptual {
            PerceptualHash::of_bytes(&bytes)
        } else {
            None
        };
        Fingerprint {
            bytes,
            content_hash,
            perceptual_hash,
            dimensions,
        }
    })
    .await
    .map_err(|e| task_failed("fingerprint", e))
}

/// Runs the acquisition pipeline for scheduled tasks
///
/// Shared by all workers behind an `Arc`; all mutable state lives in the
/// ledger and on disk.
pub struct Acquirer {
    transport: Arc<Transport>,
    ledger: Arc<Ledger>,
    layout: PathLayout,
    writer: MirrorWriter,
    normalizer: Normalizer,
    classifier: KeywordClassifier,
    robots: Arc<dyn RobotsGate>,
    config: AcquirerConfig,
    // Dedup check, persist and commit run as one unit
    commit_gate: Mutex<()>,
}

impl std::fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Acquirer")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .field("robots", &self.robots)
            .finish_non_exhaustive()
    }
}

impl Acquirer {
    pub fn new(
        transport: Arc<Transport>,
        ledger: Arc<Ledger>,
        layout: PathLayout,
        config: AcquirerConfig,
    ) -> Self {
        Self {
            transport,
            ledger,
            layout,
            writer: MirrorWriter::new(),
            normalizer: Normalizer::default(),
            classifier: KeywordClassifier::default(),
            robots: Arc::new(AllowAll),
            config,
            commit_gate: Mutex::new(()),
        }
    }

    pub fn with_classifier(mut self, classifier: KeywordClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_robots(mut self, robots: Arc<dyn RobotsGate>) -> Self {
        self.robots = robots;
        self
    }

    pub fn with_writer(mut self, writer: MirrorWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(&self) -> &AcquirerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    /// Process every tier of `task` in order
    pub async fn process(&self, task: &AcquisitionTask) -> ItemReport {
        let item = &task.item;
        let labels = self.classifier.classify_item(item);
        let mut resident: Option<Resident> = None;
        let mut tiers = Vec::with_capacity(task.tiers.len());

        for (index, tier) in task.tiers.iter().copied().enumerate() {
            let more_tiers = index + 1 < task.tiers.len();
            let outcome = self
                .process_tier(item, tier, &labels, &mut resident, more_tiers)
                .await
                .unwrap_or_else(|e| TierOutcome::Failed {
                    reason: e.to_string(),
                });

            match &outcome {
                TierOutcome::Failed { reason } => {
                    warn!("{}/{} [{}] failed: {}", item.source, item.source_id, tier, reason)
                }
                other => debug!("{}/{} [{}] {}", item.source, item.source_id, tier, other),
            }
            tiers.push((tier, outcome));
        }

        ItemReport {
            source: item.source.clone(),
            source_id: item.source_id.clone(),
            tiers,
        }
    }

    async fn process_tier(
        &self,
        item: &CandidateItem,
        tier: ResolutionTier,
        labels: &[String],
        resident: &mut Option<Resident>,
        more_tiers: bool,
    ) -> Result<TierOutcome, AppError> {
        let key = AcquisitionKey::for_item(item, tier, &self.config.aliases);
        let primary = self.layout.primary_path(item, tier);

        if self
            .check_present(&key, &primary, tier, resident, more_tiers)
            .await?
        {
            return Ok(TierOutcome::AlreadyPresent);
        }

        if self.config.derive_mode == DeriveMode::Prefer {
            if let Some(prepared) = self.derive_from_resident(item, tier, resident).await? {
                return self.finish(item, &key, tier, &primary, labels, prepared).await;
            }
        }

        let urls = candidate_urls(&item.url, tier, &self.config.aliases);
        match self.fetch_first(&key, &urls).await? {
            FetchResult::Fetched {
                url,
                bytes,
                validators,
            } => {
                if more_tiers && resident.is_none() {
                    *resident = Some(Resident {
                        tier,
                        bytes: Arc::new(bytes.clone()),
                    });
                }
                let bytes = self.shape(bytes, tier).await?;
                let prepared = Prepared {
                    bytes,
                    url: url.to_string(),
                    validators,
                    derived_from: None,
                };
                self.finish(item, &key, tier, &primary, labels, prepared).await
            }
            FetchResult::NotModified(url) => Ok(TierOutcome::NotModified {
                url: url.to_string(),
            }),
            FetchResult::Missed(reason) => {
                if self.config.derive_mode == DeriveMode::Fallback {
                    if let Some(prepared) = self.derive_from_resident(item, tier, resident).await? {
                        return self.finish(item, &key, tier, &primary, labels, prepared).await;
                    }
                }
                Ok(TierOutcome::Failed { reason })
            }
        }
    }

    /// Whether the key is recorded or its primary exists; loads bytes for
    /// later tiers and records files left behind by an interrupted run
    async fn check_present(
        &self,
        key: &AcquisitionKey,
        primary: &Path,
        tier: ResolutionTier,
        resident: &mut Option<Resident>,
        more_tiers: bool,
    ) -> Result<bool, AppError> {
        let in_ledger = self.ledger.exists(key);
        let on_disk = is_present(primary).await;
        if !in_ledger && !on_disk {
            return Ok(false);
        }
        if !in_ledger && self.ledger.path_recorded(primary) {
            debug!("{} belongs to another record, not adopting it", primary.display());
            return Ok(false);
        }

        let stored_path = if on_disk {
            Some(primary.to_path_buf())
        } else {
            self.ledger.get(key)?.map(|record| record.path)
        };

        let needs_bytes = (more_tiers && resident.is_none()) || !in_ledger;
        if let (true, Some(path)) = (needs_bytes, stored_path) {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    if !in_ledger {
                        self.record_existing(key, &path, bytes.clone()).await?;
                    }
                    if more_tiers && resident.is_none() {
                        debug!("Loaded {} from disk for derivation", path.display());
                        *resident = Some(Resident {
                            tier,
                            bytes: Arc::new(bytes),
                        });
                    }
                }
                Err(e) => debug!("Cannot read stored artifact {}: {}", path.display(), e),
            }
        }
        Ok(true)
    }

    /// Commit a record for a primary found on disk without one
    async fn record_existing(
        &self,
        key: &AcquisitionKey,
        path: &Path,
        bytes: Vec<u8>,
    ) -> Result<(), AppError> {
        let perceptual = self.config.dup_mode >= DupMode::Perceptual;
        let print = fingerprint(bytes, perceptual).await?;
        let (width, height) = print.dimensions.unwrap_or((0, 0));
        let record = LedgerRecord {
            key: key.clone(),
            url: String::new(),
            path: path.to_path_buf(),
            size: print.bytes.len() as u64,
            width,
            height,
            content_hash: print.content_hash,
            perceptual_hash: print.perceptual_hash,
            etag: None,
            last_modified: None,
            metadata: serde_json::json!({ "recovered": true }),
        };
        if self.ledger.commit(&record)? {
            info!("Recorded existing file {}", path.display());
        }
        Ok(())
    }

    /// Make sure `resident` holds a tier above `tier`, checking disk if needed
    async fn load_higher_resident(
        &self,
        item: &CandidateItem,
        tier: ResolutionTier,
        resident: &mut Option<Resident>,
    ) -> Result<(), AppError> {
        if resident.as_ref().is_some_and(|r| r.tier < tier) {
            return Ok(());
        }
        for higher in ResolutionTier::ALL.iter().copied().filter(|t| *t < tier) {
            let mut path = self.layout.primary_path(item, higher);
            if !is_present(&path).await {
                let key = AcquisitionKey::for_item(item, higher, &self.config.aliases);
                match self.ledger.get(&key)? {
                    Some(record) if is_present(&record.path).await => path = record.path,
                    _ => continue,
                }
            }
            if let Ok(bytes) = tokio::fs::read(&path).await {
                debug!("Using {} from disk for derivation", path.display());
                *resident = Some(Resident {
                    tier: higher,
                    bytes: Arc::new(bytes),
                });
                return Ok(());
            }
        }
        Ok(())
    }

    async fn derive_from_resident(
        &self,
        item: &CandidateItem,
        tier: ResolutionTier,
        resident: &mut Option<Resident>,
    ) -> Result<Option<Prepared>, AppError> {
        if tier.is_highest() {
            return Ok(None);
        }
        self.load_higher_resident(item, tier, resident).await?;
        let Some(source) = resident.as_ref().filter(|r| r.tier < tier) else {
            return Ok(None);
        };

        let bytes = source.bytes.clone();
        let from = source.tier;
        let normalizer = self.normalizer;
        let exact = self.config.exact;
        let derived = tokio::task::spawn_blocking(move || {
            if exact {
                normalizer.cover_crop(&bytes, tier.bounding_box())
            } else {
                normalizer.derive(&bytes, tier)
            }
        })
        .await
        .map_err(|e| task_failed("derive", e))?;

        match derived {
            Some(bytes) => Ok(Some(Prepared {
                bytes,
                url: item.url.to_string(),
                validators: CacheValidators::default(),
                derived_from: Some(from),
            })),
            None => {
                debug!("Cannot derive {} from {} bytes", tier, from);
                Ok(None)
            }
        }
    }

    /// Fit fetched bytes to the tier box (or crop to it exactly)
    async fn shape(&self, bytes: Vec<u8>, tier: ResolutionTier) -> Result<Vec<u8>, AppError> {
        if !self.config.exact && tier.is_highest() {
            return Ok(bytes);
        }
        let normalizer = self.normalizer;
        let exact = self.config.exact;
        tokio::task::spawn_blocking(move || {
            if exact {
                match normalizer.cover_crop(&bytes, tier.bounding_box()) {
                    Some(cropped) => cropped,
                    None => bytes,
                }
            } else {
                normalizer.normalize(bytes, tier)
            }
        })
        .await
        .map_err(|e| task_failed("normalize", e))
    }

    async fn fetch_first(
        &self,
        key: &AcquisitionKey,
        urls: &[Url],
    ) -> Result<FetchResult, AppError> {
        let mut misses = Vec::new();
        for url in urls {
            if !self.robots.allowed(url) {
                misses.push(
                    TransferError::RobotsDenied {
                        url: url.to_string(),
                    }
                    .to_string(),
                );
                continue;
            }

            if self.config.is_archive(url) {
                debug!("Archive URL {}, fetching directly", url);
            } else {
                match self.transport.probe_status(url).await {
                    ProbeOutcome::Available => {}
                    ProbeOutcome::Absent => {
                        debug!("Probe confirmed {} is absent", url);
                        misses.push(
                            TransferError::PermanentMiss {
                                url: url.to_string(),
                            }
                            .to_string(),
                        );
                        continue;
                    }
                    ProbeOutcome::Unknown => {
                        debug!("Probe of {} inconclusive, trying a direct GET", url)
                    }
                }
            }

            match self.fetch_one(key, url).await {
                Ok(Some((bytes, validators))) => {
                    return Ok(FetchResult::Fetched {
                        url: url.clone(),
                        bytes,
                        validators,
                    });
                }
                Ok(None) => return Ok(FetchResult::NotModified(url.clone())),
                Err(AppError::Transfer(e)) => {
                    debug!("Candidate {} failed: {}", url, e);
                    misses.push(e.to_string());
                }
                Err(other) => return Err(other),
            }
        }

        Ok(FetchResult::Missed(if misses.is_empty() {
            "no candidate URLs".to_string()
        } else {
            misses.join("; ")
        }))
    }

    /// Fetch one URL; `None` means the server answered 304
    async fn fetch_one(
        &self,
        key: &AcquisitionKey,
        url: &Url,
    ) -> Result<Option<(Vec<u8>, CacheValidators)>, AppError> {
        let transport_config = self.transport.config();

        if !self.config.resumable {
            let bytes = self
                .transport
                .download(url, transport_config.download_retries)
                .await?;
            let (bytes, verified) = tokio::task::spawn_blocking(move || {
                let verified = verify_complete_image(&bytes);
                (bytes, verified)
            })
            .await
            .map_err(|e| task_failed("verify", e))?;
            if let Err(reason) = verified {
                return Err(TransferError::integrity(url.as_str(), reason).into());
            }
            return Ok(Some((bytes, CacheValidators::default())));
        }

        let staging = self.layout.staging_path(key, url);
        let validators = self.ledger.lookup_headers_for_url(url.as_str())?;
        let outcome = self
            .transport
            .download_resumable(
                url,
                &validators,
                &staging,
                transport_config.resumable_max_tries,
            )
            .await?;

        match outcome {
            ResumableOutcome::NotModified => Ok(None),
            ResumableOutcome::Downloaded {
                etag,
                last_modified,
                ..
            } => {
                let bytes = tokio::fs::read(&staging).await?;
                let _ = tokio::fs::remove_file(&staging).await;
                Ok(Some((
                    bytes,
                    CacheValidators {
                        etag,
                        last_modified,
                    },
                )))
            }
        }
    }

    /// Dedup against stored artifacts, then persist and commit
    async fn finish(
        &self,
        item: &CandidateItem,
        key: &AcquisitionKey,
        tier: ResolutionTier,
        primary: &Path,
        labels: &[String],
        prepared: Prepared,
    ) -> Result<TierOutcome, AppError> {
        let perceptual = self.config.dup_mode >= DupMode::Perceptual;
        let print = fingerprint(prepared.bytes, perceptual).await?;

        let _gate = self.commit_gate.lock().await;

        if let Some(existing) = self.find_duplicate(key, &print).await? {
            match self.config.dup_action {
                DupAction::Skip => {
                    info!("{} duplicates {}, skipped", key, existing.path.display());
                    return Ok(TierOutcome::DuplicateSkipped {
                        existing: existing.path,
                    });
                }
                DupAction::Link => {
                    return self
                        .link_duplicate(item, key, tier, labels, &prepared.url, prepared.validators, existing)
                        .await;
                }
                DupAction::Keep => {
                    debug!("{} duplicates {}, keeping a copy", key, existing.path.display())
                }
            }
        }

        if is_present(primary).await {
            // Only claim a file that already holds exactly these bytes
            let on_disk = tokio::fs::read(primary).await?;
            if ContentHash::of(&on_disk) != print.content_hash {
                warn!(
                    "{} not stored: {} already holds different content",
                    key,
                    primary.display()
                );
                return Ok(TierOutcome::Failed {
                    reason: format!("{} already holds different content", primary.display()),
                });
            }
        }

        let mirrors = self.layout.mirror_paths(primary, tier, labels);
        let report = self.writer.save(&print.bytes, primary, &mirrors).await?;
        let (width, height) = print.dimensions.unwrap_or((0, 0));
        let record = LedgerRecord {
            key: key.clone(),
            url: prepared.url.clone(),
            path: primary.to_path_buf(),
            size: print.bytes.len() as u64,
            width,
            height,
            content_hash: print.content_hash,
            perceptual_hash: print.perceptual_hash,
            etag: prepared.validators.etag,
            last_modified: prepared.validators.last_modified,
            metadata: self.metadata(item, labels, prepared.derived_from),
        };
        self.ledger.commit(&record)?;

        if !report.primary_written {
            return Ok(TierOutcome::AlreadyPresent);
        }
        Ok(match prepared.derived_from {
            Some(from) => TierOutcome::Derived {
                from,
                bytes: report.bytes_written,
            },
            None => TierOutcome::Downloaded {
                url: prepared.url,
                bytes: report.bytes_written,
            },
        })
    }

    /// Stored artifact these bytes duplicate, under the configured mode
    ///
    /// Content matches take precedence over perceptual ones. Other tiers of
    /// the same item never count, and neither do records whose file is gone.
    async fn find_duplicate(
        &self,
        key: &AcquisitionKey,
        print: &Fingerprint,
    ) -> Result<Option<LedgerRecord>, AppError> {
        if self.config.dup_mode < DupMode::Content {
            return Ok(None);
        }

        let mut candidate = self.ledger.find_by_content_hash(&print.content_hash)?;
        if candidate.is_none() && self.config.dup_mode >= DupMode::Perceptual {
            if let Some(phash) = &print.perceptual_hash {
                candidate = self
                    .ledger
                    .find_perceptual_match(phash, self.config.phash_distance)?;
            }
        }

        match candidate {
            Some(existing)
                if !(existing.key.source == key.source && existing.key.identity == key.identity)
                    && is_present(&existing.path).await =>
            {
                Ok(Some(existing))
            }
            _ => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn link_duplicate(
        &self,
        item: &CandidateItem,
        key: &AcquisitionKey,
        tier: ResolutionTier,
        labels: &[String],
        url: &str,
        validators: CacheValidators,
        existing: LedgerRecord,
    ) -> Result<TierOutcome, AppError> {
        let mirrors = self.layout.mirror_paths(&existing.path, tier, labels);
        self.writer.link_mirrors(&existing.path, &mirrors).await?;

        // Same URL fetched again: the original record may lack validators
        if existing.url == url && self.ledger.amend_validators(&existing.key, &validators)? {
            debug!("Filled cache validators of {}", existing.key);
        }

        let mut metadata = self.metadata(item, labels, None);
        if let Some(map) = metadata.as_object_mut() {
            map.insert("duplicate_of".to_string(), existing.key.to_string().into());
        }
        let record = LedgerRecord {
            key: key.clone(),
            url: url.to_string(),
            path: existing.path.clone(),
            size: existing.size,
            width: existing.width,
            height: existing.height,
            content_hash: existing.content_hash,
            perceptual_hash: existing.perceptual_hash,
            etag: validators.etag,
            last_modified: validators.last_modified,
            metadata,
        };
        self.ledger.commit(&record)?;
        info!("{} linked to existing {}", key, existing.path.display());
        Ok(TierOutcome::DuplicateLinked {
            existing: existing.path,
        })
    }

    fn metadata(
        &self,
        item: &CandidateItem,
        labels: &[String],
        derived_from: Option<ResolutionTier>,
    ) -> serde_json::Value {
        serde_json::json!({
            "source_id": item.source_id,
            "title": item.title,
            "source_url": item.url.as_str(),
            "labels": labels,
            "derived_from": derived_from.map(|t| t.name()),
            "extra": item.metadata,
        })
    }

    /// Primary path an item's tier would be written to
    pub fn primary_path(&self, item: &CandidateItem, tier: ResolutionTier) -> PathBuf {
        self.layout.primary_path(item, tier)
    }
}
