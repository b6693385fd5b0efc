//! Configuration management for Wallpaper Fetcher
//!
//! One TOML file with a section per concern. Every value has a default, so a
//! missing file or a partial one is fine; the effective configuration is
//! validated as a whole before any network activity starts.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::acquirer::{AcquirerConfig, DeriveMode, DupAction, DupMode};
use crate::app::client::TransportConfig;
use crate::app::models::{HostAliases, ResolutionTier};
use crate::app::normalizer::Normalizer;
use crate::app::source::{AllowAll, DenyHosts, RobotsGate};
use crate::app::store::{KeywordClassifier, MirrorWriter};
use crate::app::store::classify::default_rules;
use crate::app::worker::WorkerConfig;
use crate::constants::{FALLBACK_LABEL, config as paths, image, limits, workers};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub acquisition: AcquisitionConfigToml,
    pub workers: WorkerConfig,
    pub storage: StorageConfigToml,
    pub classify: ClassifyConfigToml,
    pub robots: RobotsConfigToml,
    pub hosts: HostsConfigToml,
}

/// What to fetch and how duplicates are treated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfigToml {
    /// Tier names, any order; processed highest fidelity first
    pub tiers: Vec<String>,
    /// Candidates requested from each source per tier
    pub limit_per_source: usize,
    pub dup_mode: DupMode,
    pub dup_action: DupAction,
    pub derive_mode: DeriveMode,
    /// Maximum Hamming distance for perceptual duplicates
    pub phash_distance: u32,
    /// Center-crop to the exact tier box instead of fitting inside it
    pub exact: bool,
    /// Resume interrupted downloads through the staging directory
    pub resumable: bool,
}

impl Default for AcquisitionConfigToml {
    fn default() -> Self {
        Self {
            tiers: ResolutionTier::ALL.iter().map(|t| t.name().to_string()).collect(),
            limit_per_source: workers::DEFAULT_LIMIT_PER_SOURCE,
            dup_mode: DupMode::Content,
            dup_action: DupAction::Link,
            derive_mode: DeriveMode::Prefer,
            phash_distance: image::DEFAULT_PHASH_DISTANCE,
            exact: false,
            resumable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfigToml {
    /// Output root; holds the tier directories and the ledger
    pub root: PathBuf,
    /// JPEG quality for resized output
    pub jpeg_quality: u8,
    /// Hard-link mirrors to their primary; copies are used when false
    pub hard_links: bool,
}

impl Default for StorageConfigToml {
    fn default() -> Self {
        Self {
            root: PathBuf::from(paths::DEFAULT_OUTPUT_ROOT),
            jpeg_quality: image::JPEG_QUALITY,
            hard_links: true,
        }
    }
}

/// Mirror classification table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfigToml {
    /// Label for items no keyword matches; empty disables fallback mirrors
    pub fallback: String,
    /// Label to keywords
    pub labels: BTreeMap<String, Vec<String>>,
}

impl Default for ClassifyConfigToml {
    fn default() -> Self {
        Self {
            fallback: FALLBACK_LABEL.to_string(),
            labels: default_rules(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotsConfigToml {
    /// Hosts (and their subdomains) never fetched from
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostsConfigToml {
    /// Hosts fetched directly, without an existence probe
    pub archive: Vec<String>,
    /// Host rewrites applied when normalizing URLs
    pub aliases: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from the first file found
    ///
    /// An explicit path must exist; otherwise `./wallpaper-fetcher.toml`,
    /// then `<config_dir>/wallpaper-fetcher/config.toml`, then defaults.
    pub async fn load(config_file_override: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = config_file_override {
            if !path.exists() {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            return Self::load_from_file(path).await;
        }

        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(paths::LOCAL_CONFIG_FILE)];
        search_paths.extend(Self::default_config_path());
        search_paths.into_iter().find(|path| {
            let found = path.is_file();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Per-user config file location, if the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::APP_DIR_NAME).join(paths::CONFIG_FILE_NAME))
    }

    pub async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the commented default file; refuses to overwrite unless `force`
    pub async fn write_default(path: &Path, force: bool) -> ConfigResult<()> {
        if path.exists() && !force {
            return Err(ConfigError::invalid(
                "path",
                path.display(),
                "file already exists (use --force to overwrite)",
            ));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, Self::default_config_content()).await?;
        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Parsed tier list in processing order
    pub fn tiers(&self) -> ConfigResult<Vec<ResolutionTier>> {
        parse_tiers(&self.acquisition.tiers)
    }

    pub fn acquirer_config(&self) -> AcquirerConfig {
        let acquisition = &self.acquisition;
        AcquirerConfig {
            dup_mode: acquisition.dup_mode,
            dup_action: acquisition.dup_action,
            derive_mode: acquisition.derive_mode,
            phash_distance: acquisition.phash_distance,
            exact: acquisition.exact,
            resumable: acquisition.resumable,
            archive_hosts: self
                .hosts
                .archive
                .iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .collect::<HashSet<_>>(),
            aliases: HostAliases::new(self.hosts.aliases.clone()),
        }
    }

    pub fn classifier(&self) -> KeywordClassifier {
        let fallback = Some(self.classify.fallback.trim())
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        KeywordClassifier::new(self.classify.labels.clone(), fallback)
    }

    pub fn robots(&self) -> Arc<dyn RobotsGate> {
        if self.robots.deny.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(DenyHosts::new(&self.robots.deny))
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.storage.jpeg_quality)
    }

    pub fn writer(&self) -> MirrorWriter {
        MirrorWriter::new().with_hard_links(self.storage.hard_links)
    }

    /// Check every section; the first invalid value wins
    pub fn validate(&self) -> ConfigResult<()> {
        self.transport.validate()?;
        self.workers.validate(self.transport.max_in_flight)?;
        self.acquirer_config().validate()?;
        self.tiers()?;
        if self.acquisition.limit_per_source == 0 {
            return Err(ConfigError::invalid(
                "acquisition.limit_per_source",
                0,
                "at least one candidate per source is required",
            ));
        }
        if !(1..=100).contains(&self.storage.jpeg_quality) {
            return Err(ConfigError::invalid(
                "storage.jpeg_quality",
                self.storage.jpeg_quality,
                "must be between 1 and 100",
            ));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::invalid(
                "storage.root",
                "\"\"",
                "an output directory is required",
            ));
        }
        Ok(())
    }

    /// Default configuration file with explanatory comments
    pub fn default_config_content() -> String {
        format!(
            r#"# Wallpaper Fetcher configuration
# Every setting is optional; removed keys fall back to these defaults.

[transport]
request_timeout = "60s"
connect_timeout = "20s"
pool_max_per_host = 16
# Concurrent requests across the process; must not exceed workers.worker_count
max_in_flight = {max_in_flight}
rate_limit_rps = {rate}
json_retries = 3
probe_retries = 2
download_retries = 3
resumable_max_tries = 3
# Backoff before retry i is min(backoff_step * (i + 1), cap)
backoff_step = "1500ms"
backoff_cap = "6s"
probe_backoff_cap = "4s"
default_retry_after = "2s"
max_retry_after = "2m"

[acquisition]
# 4k, 2k, 1k (or high, medium, low)
tiers = ["4k", "2k", "1k"]
limit_per_source = {limit}
# url, content or perceptual; each mode includes the previous ones
dup_mode = "content"
# skip, link or keep
dup_action = "link"
# prefer, fallback or off
derive_mode = "prefer"
phash_distance = {phash}
exact = false
resumable = true

[workers]
worker_count = {workers}
event_buffer_size = {buffer}

[storage]
root = "{root}"
jpeg_quality = {quality}
# Mirrors are hard links to the primary; set false to store copies
hard_links = true

[classify]
# Items matching no keyword are mirrored under this label; "" disables it
fallback = "{fallback}"
# Replace the built-in table by listing labels here:
# [classify.labels]
# animals = ["animal", "bird", "fox"]
# nature = ["mountain", "forest", "lake"]

[robots]
# Hosts never fetched from, subdomains included
deny = []

[hosts]
# Hosts fetched without an existence probe
archive = []

[hosts.aliases]
# "cdn.example.com" = "www.example.com"
"#,
            max_in_flight = limits::DEFAULT_MAX_IN_FLIGHT,
            rate = limits::DEFAULT_RATE_LIMIT_RPS,
            limit = workers::DEFAULT_LIMIT_PER_SOURCE,
            phash = image::DEFAULT_PHASH_DISTANCE,
            workers = workers::DEFAULT_WORKER_COUNT,
            buffer = workers::CHANNEL_BUFFER_SIZE,
            root = paths::DEFAULT_OUTPUT_ROOT,
            quality = image::JPEG_QUALITY,
            fallback = FALLBACK_LABEL,
        )
    }
}

/// Parse tier names, rejecting unknown ones, into processing order
pub fn parse_tiers<S: AsRef<str>>(names: &[S]) -> ConfigResult<Vec<ResolutionTier>> {
    if names.is_empty() {
        return Err(ConfigError::invalid(
            "acquisition.tiers",
            "[]",
            "at least one tier is required",
        ));
    }
    let tiers = names
        .iter()
        .map(|name| name.as_ref().parse::<ResolutionTier>())
        .collect::<ConfigResult<Vec<_>>>()?;
    Ok(ResolutionTier::ordered(&tiers))
}
