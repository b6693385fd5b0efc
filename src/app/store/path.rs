//! Deterministic on-disk layout
//!
//! Structure:
//! - Dated items: `{root}/{tier}/{YYYY}/{MM}/{YYYYMMDD}-{title}.{tier}{ext}`
//! - Other items: `{root}/{tier}/{source}/{base}-{id}.{tier}{ext}`
//! - Mirrors: `{root}/{tier}/{label}/{primary file name}`
//! - Staging: `{root}/.staging/{hash of key and url}{ext}`

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::app::hash::ContentHash;
use crate::app::models::{AcquisitionKey, CandidateItem, ResolutionTier};
use crate::constants::files;

fn reserved_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("valid reserved-character pattern"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

fn copyright_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\(©.*?\)\s*$").expect("valid copyright pattern"))
}

/// Replace reserved characters, collapse whitespace and truncate
pub fn safe_filename(name: &str) -> String {
    let replaced = reserved_chars().replace_all(name, "_");
    let collapsed = whitespace().replace_all(&replaced, " ");
    collapsed
        .trim()
        .chars()
        .take(files::MAX_FILENAME_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Extension (with dot) taken from the URL path when recognised
pub fn extension_for(url: &Url) -> &'static str {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default()
        .to_ascii_lowercase();
    files::KNOWN_EXTENSIONS
        .iter()
        .find(|ext| last.ends_with(*ext))
        .copied()
        .unwrap_or(files::DEFAULT_EXTENSION)
}

fn strip_known_extension(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    files::KNOWN_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext))
        .map(|ext| &name[..name.len() - ext.len()])
        .unwrap_or(name)
}

/// Append the item id so undated items sharing a title keep distinct files
fn with_id_suffix(base: String, id: &str) -> String {
    if id.is_empty() || base.is_empty() || base == id {
        return base;
    }
    let room = files::MAX_FILENAME_CHARS.saturating_sub(id.chars().count() + 1);
    let base: String = base.chars().take(room).collect();
    format!("{}-{}", base.trim_end(), id)
}

/// Path builder rooted at the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    root: PathBuf,
}

impl PathLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(files::LEDGER_FILE_NAME)
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(files::STAGING_DIR_NAME)
    }

    /// Stable download target for one key fetched from one URL
    ///
    /// Stable across runs so an interrupted transfer resumes from its
    /// partial file.
    pub fn staging_path(&self, key: &AcquisitionKey, url: &Url) -> PathBuf {
        let digest = ContentHash::of(format!("{}\n{}", key, url).as_bytes()).to_hex();
        self.staging_dir()
            .join(format!("{}{}", &digest[..32], extension_for(url)))
    }

    /// Base name without tier tag or extension
    pub fn base_name(item: &CandidateItem) -> String {
        let base = match item.date {
            Some(date) => {
                let title = item.title.as_deref().unwrap_or(&item.source);
                let title = copyright_suffix().replace(title, "");
                safe_filename(&format!("{}-{}", date.format("%Y%m%d"), title))
            }
            None => {
                let from_url = item
                    .url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                let hint = item
                    .filename_hint
                    .clone()
                    .or_else(|| item.title.clone())
                    .or(from_url)
                    .unwrap_or_default();
                with_id_suffix(
                    safe_filename(strip_known_extension(&hint)),
                    &safe_filename(&item.source_id),
                )
            }
        };
        if base.is_empty() {
            let id = safe_filename(&item.source_id);
            if id.is_empty() {
                "item".to_string()
            } else {
                id
            }
        } else {
            base
        }
    }

    /// File name of an item's primary artifact at a tier
    pub fn file_name(item: &CandidateItem, tier: ResolutionTier) -> String {
        format!(
            "{}.{}{}",
            Self::base_name(item),
            tier.name(),
            extension_for(&item.url)
        )
    }

    pub fn primary_path(&self, item: &CandidateItem, tier: ResolutionTier) -> PathBuf {
        let mut path = self.root.join(tier.name());
        match item.date {
            Some(date) => {
                path.push(date.format("%Y").to_string());
                path.push(date.format("%m").to_string());
            }
            None => {
                let source = safe_filename(&item.source);
                path.push(if source.is_empty() { "source" } else { &source });
            }
        }
        path.push(Self::file_name(item, tier));
        path
    }

    /// One mirror per label, named after the primary file
    pub fn mirror_paths(
        &self,
        primary: &Path,
        tier: ResolutionTier,
        labels: &[String],
    ) -> Vec<PathBuf> {
        let Some(file_name) = primary.file_name() else {
            return Vec::new();
        };
        labels
            .iter()
            .map(|label| safe_filename(label))
            .filter(|label| !label.is_empty())
            .map(|label| self.root.join(tier.name()).join(label).join(file_name))
            .collect()
    }
}
