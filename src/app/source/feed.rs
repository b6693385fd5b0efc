//! JSON feed source
//!
//! A feed is either a bare array of entries or an object:
//!
//! ```json
//! {
//!   "chain_tiers": true,
//!   "items": [
//!     { "id": "fox", "url": "https://img.example.com/OHR.Fox_UHD.jpg",
//!       "title": "Red fox", "date": "2024-01-07", "market": "en-US",
//!       "tags": ["wildlife"], "metadata": { "copyright": "Someone" } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::app::client::Transport;
use crate::app::models::CandidateItem;
use crate::app::source::{CandidateSource, SearchOptions};
use crate::errors::{SourceError, SourceResult};

/// Where a feed document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLocation {
    File(PathBuf),
    Remote(Url),
}

impl FeedLocation {
    /// `http(s)://` values are remote, anything else is a file path
    pub fn parse(value: &str) -> Self {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            _ => Self::File(PathBuf::from(value)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Remote(url) => url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    Object {
        #[serde(default)]
        chain_tiers: Option<bool>,
        items: Vec<FeedEntry>,
    },
    List(Vec<FeedEntry>),
}

impl FeedDocument {
    fn into_parts(self) -> (Option<bool>, Vec<FeedEntry>) {
        match self {
            Self::Object { chain_tiers, items } => (chain_tiers, items),
            Self::List(items) => (None, items),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    id: Option<String>,
    url: String,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value.get(..8).unwrap_or(value), "%Y%m%d"))
        .ok()
}

impl FeedEntry {
    fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&query))
            || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
    }

    fn into_item(self, source: &str, position: usize) -> Result<CandidateItem, String> {
        let url = Url::parse(&self.url).map_err(|e| format!("invalid url '{}': {}", self.url, e))?;
        let id = self.id.unwrap_or_else(|| position.to_string());
        let mut item = CandidateItem::new(source, id, url).with_tags(self.tags);
        item.metadata = self.metadata;
        if let (Some(w), Some(h)) = (self.width, self.height) {
            item = item.with_dimensions(w, h);
        }
        if let Some(title) = self.title {
            item = item.with_title(title);
        }
        if let Some(filename) = self.filename {
            item = item.with_filename_hint(filename);
        }
        if let Some(date) = self.date.as_deref() {
            match parse_date(date) {
                Some(date) => item = item.with_date(date, self.market),
                None => return Err(format!("invalid date '{}'", date)),
            }
        }
        Ok(item)
    }
}

/// Candidate source backed by a JSON document
#[derive(Debug, Clone)]
pub struct FeedSource {
    name: String,
    location: FeedLocation,
    transport: Option<Arc<Transport>>,
    chain_tiers: bool,
}

impl FeedSource {
    /// Feed read from a local file
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            location: FeedLocation::File(path.into()),
            transport: None,
            chain_tiers: false,
        }
    }

    /// Feed read from a file path or an HTTP(S) URL
    pub fn new(name: impl Into<String>, location: FeedLocation, transport: Arc<Transport>) -> Self {
        Self {
            name: name.into(),
            location,
            transport: Some(transport),
            chain_tiers: false,
        }
    }

    /// Default for documents that do not declare `chain_tiers`
    pub fn with_chain_tiers(mut self, chain: bool) -> Self {
        self.chain_tiers = chain;
        self
    }

    pub fn location(&self) -> &FeedLocation {
        &self.location
    }

    /// Adopt the document's own `chain_tiers` flag when it declares one
    ///
    /// An unreadable feed keeps the current setting; `search` reports the
    /// failure later.
    pub async fn detect_chain_tiers(mut self) -> Self {
        match self.load("").await {
            Ok(document) => {
                if let Some(chain) = document.into_parts().0 {
                    self.chain_tiers = chain;
                }
            }
            Err(e) => debug!("Could not inspect feed {}: {}", self.name, e),
        }
        self
    }

    async fn load(&self, query: &str) -> SourceResult<FeedDocument> {
        let location = self.location.describe();
        let document = match &self.location {
            FeedLocation::File(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| SourceError::Read {
                        location: location.clone(),
                        source,
                    })?;
                serde_json::from_str(&text).map_err(|e| SourceError::InvalidFormat {
                    location: location.clone(),
                    reason: e.to_string(),
                })?
            }
            FeedLocation::Remote(url) => {
                let transport = self.transport.as_ref().ok_or_else(|| SourceError::Failed {
                    source_name: self.name.clone(),
                    reason: "remote feed without a transport".to_string(),
                })?;
                let retries = transport.config().json_retries;
                let params: Vec<(&str, &str)> = if query.is_empty() {
                    Vec::new()
                } else {
                    vec![("q", query)]
                };
                transport.fetch_json(url, &params, retries).await?
            }
        };
        debug!("Loaded feed {} from {}", self.name, location);
        Ok(document)
    }
}

#[async_trait]
impl CandidateSource for FeedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn chains_tiers(&self) -> bool {
        self.chain_tiers
    }

    async fn search(
        &self,
        query: &str,
        _width: u32,
        _height: u32,
        limit: usize,
        _options: &SearchOptions,
    ) -> SourceResult<Vec<CandidateItem>> {
        let (_, entries) = self.load(query).await?.into_parts();
        let mut items = Vec::new();
        for (position, entry) in entries.into_iter().enumerate() {
            if items.len() >= limit {
                break;
            }
            if !entry.matches(query) {
                continue;
            }
            match entry.into_item(&self.name, position) {
                Ok(item) => items.push(item),
                Err(reason) => warn!("Skipping entry {} of feed {}: {}", position, self.name, reason),
            }
        }
        Ok(items)
    }
}
