//! Data models for Wallpaper Fetcher
//!
//! Candidate items as produced by sources, the resolution tier table, the
//! acquisition key that identifies one stored artifact slot, and the durable
//! ledger record written once an artifact is persisted.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::hash::{ContentHash, PerceptualHash};
use crate::errors::ConfigError;

/// Maximum pixel box a tier's output must fit into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether an image of the given size already fits
    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.width && height <= self.height
    }
}

/// Target output size, ordered from highest fidelity to lowest
///
/// Declaration order is the processing order: a lower tier may be derived
/// from bytes of any tier that sorts before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResolutionTier {
    /// 3840x2160
    High,
    /// 2560x1440
    Medium,
    /// 1920x1080
    Low,
}

impl ResolutionTier {
    /// All tiers, highest fidelity first
    pub const ALL: [ResolutionTier; 3] = [Self::High, Self::Medium, Self::Low];

    /// Short name used on disk and in ledger keys
    pub fn name(&self) -> &'static str {
        match self {
            Self::High => "4k",
            Self::Medium => "2k",
            Self::Low => "1k",
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Self::High => BoundingBox::new(3840, 2160),
            Self::Medium => BoundingBox::new(2560, 1440),
            Self::Low => BoundingBox::new(1920, 1080),
        }
    }

    /// URL size suffixes to try for this tier, highest fidelity first
    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Self::High => &["UHD"],
            Self::Medium => &["2560x1440", "1920x1200"],
            Self::Low => &["1920x1080"],
        }
    }

    pub fn is_highest(&self) -> bool {
        *self == Self::High
    }

    /// Sort and deduplicate a tier list into processing order
    pub fn ordered(tiers: &[ResolutionTier]) -> Vec<ResolutionTier> {
        let mut tiers = tiers.to_vec();
        tiers.sort();
        tiers.dedup();
        tiers
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResolutionTier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "4k" | "uhd" | "high" => Ok(Self::High),
            "2k" | "medium" => Ok(Self::Medium),
            "1k" | "fhd" | "low" => Ok(Self::Low),
            _ => Err(ConfigError::UnknownTier {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ResolutionTier {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResolutionTier> for String {
    fn from(tier: ResolutionTier) -> Self {
        tier.name().to_string()
    }
}

/// One asset offered by a candidate source
///
/// Produced once by a source and shared read-only (behind an `Arc`) with the
/// worker that processes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Name of the source that produced this item
    pub source: String,
    /// Source-local identifier
    pub source_id: String,
    pub url: Url,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Human readable title, used for filenames and classification
    pub title: Option<String>,
    /// Preferred base filename
    pub filename_hint: Option<String>,
    /// Publication date for time-series sources
    pub date: Option<NaiveDate>,
    /// Market/locale for time-series sources
    pub market: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Provider-specific extras, stored verbatim in the ledger
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CandidateItem {
    pub fn new(source: impl Into<String>, source_id: impl Into<String>, url: Url) -> Self {
        Self {
            source: source.into(),
            source_id: source_id.into(),
            url,
            width: None,
            height: None,
            title: None,
            filename_hint: None,
            date: None,
            market: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_filename_hint(mut self, hint: impl Into<String>) -> Self {
        self.filename_hint = Some(hint.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate, market: Option<String>) -> Self {
        self.date = Some(date);
        self.market = market;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Logical `market:date` identity for time-series items
    pub fn logical_key(&self) -> Option<String> {
        self.date.map(|date| {
            let market = self.market.as_deref().unwrap_or("default");
            format!("{}:{}", market, date.format("%Y-%m-%d"))
        })
    }
}

/// Host rewrites applied when normalizing URLs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostAliases(HashMap<String, String>);

impl HostAliases {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self(
            aliases
                .into_iter()
                .map(|(from, to)| (from.to_ascii_lowercase(), to.to_ascii_lowercase()))
                .collect(),
        )
    }

    /// Strip the fragment and rewrite aliased hosts
    pub fn normalize(&self, url: &Url) -> Url {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        if let Some(target) = url.host_str().and_then(|host| self.0.get(host)) {
            // set_host only fails for cannot-be-a-base URLs, which never reach here
            let _ = normalized.set_host(Some(target));
        }
        normalized
    }
}

/// Unique identity of one stored artifact slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcquisitionKey {
    pub source: String,
    pub tier: ResolutionTier,
    /// Logical `market:date` key or the normalized URL
    pub identity: String,
}

impl AcquisitionKey {
    pub fn new(source: impl Into<String>, tier: ResolutionTier, identity: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            tier,
            identity: identity.into(),
        }
    }

    /// Deterministic key for an item at a tier
    pub fn for_item(item: &CandidateItem, tier: ResolutionTier, aliases: &HostAliases) -> Self {
        let identity = item
            .logical_key()
            .unwrap_or_else(|| aliases.normalize(&item.url).to_string());
        Self::new(item.source.clone(), tier, identity)
    }

    /// SHA-256 of the identity, the durable key column
    pub fn key_hash(&self) -> String {
        ContentHash::of(self.identity.as_bytes()).to_hex()
    }
}

impl fmt::Display for AcquisitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.tier, self.identity)
    }
}

/// Durable record of one persisted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub key: AcquisitionKey,
    /// URL the bytes were obtained from, or the source URL for derived tiers
    pub url: String,
    pub path: PathBuf,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub content_hash: ContentHash,
    pub perceptual_hash: Option<PerceptualHash>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub metadata: serde_json::Value,
}

/// Conditional request validators replayed on the next fetch of a URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// Per-download progress, owned by a single worker for one item
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferState {
    /// Bytes already present in the partial file
    pub offset: u64,
    /// Total size advertised by the server, if known
    pub expected_total: Option<u64>,
    /// Attempts made so far
    pub attempt: u32,
}

impl TransferState {
    /// `Range` header value continuing from the current offset
    pub fn range_header(&self) -> Option<String> {
        (self.offset > 0).then(|| format!("bytes={}-", self.offset))
    }

    /// Whether the transferred size satisfies the advertised length
    pub fn size_satisfied(&self, actual: u64) -> bool {
        self.expected_total.map_or(true, |expected| actual >= expected)
    }
}

/// One unit of scheduled work: an item and the tiers to acquire for it
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionTask {
    pub item: Arc<CandidateItem>,
    /// Tiers in processing order, highest fidelity first
    pub tiers: Vec<ResolutionTier>,
}

impl AcquisitionTask {
    pub fn new(item: Arc<CandidateItem>, tiers: &[ResolutionTier]) -> Self {
        Self {
            item,
            tiers: ResolutionTier::ordered(tiers),
        }
    }

    pub fn label(&self) -> String {
        let tiers: Vec<&str> = self.tiers.iter().map(|t| t.name()).collect();
        format!(
            "{}/{} [{}]",
            self.item.source,
            self.item.source_id,
            tiers.join(",")
        )
    }
}
