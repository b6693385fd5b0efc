//! Acquisition policy

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::models::HostAliases;
use crate::constants::image::DEFAULT_PHASH_DISTANCE;
use crate::errors::{ConfigError, ConfigResult};

/// How strongly to deduplicate; each level includes the ones before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DupMode {
    /// Acquisition key only
    Url,
    /// Plus identical bytes
    Content,
    /// Plus near-identical images
    Perceptual,
}

/// What to do with bytes that duplicate an existing artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DupAction {
    /// Discard them
    Skip,
    /// Mirror the existing artifact and record the new key against it
    Link,
    /// Store a separate copy anyway
    Keep,
}

/// When lower tiers are produced from resident higher-tier bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeriveMode {
    /// Derive before touching the network
    Prefer,
    /// Derive only after every candidate URL failed
    Fallback,
    Off,
}

macro_rules! lowercase_enum {
    ($ty:ident, $($variant:ident => $name:literal),+ $(,)?) => {
        impl $ty {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ConfigError::invalid(
                        stringify!($ty),
                        other,
                        concat!("expected one of:", $(" ", $name),+),
                    )),
                }
            }
        }
    };
}

lowercase_enum!(DupMode, Url => "url", Content => "content", Perceptual => "perceptual");
lowercase_enum!(DupAction, Skip => "skip", Link => "link", Keep => "keep");
lowercase_enum!(DeriveMode, Prefer => "prefer", Fallback => "fallback", Off => "off");

/// Runtime policy for the per-item state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquirerConfig {
    pub dup_mode: DupMode,
    pub dup_action: DupAction,
    pub derive_mode: DeriveMode,
    /// Maximum Hamming distance for a perceptual match
    pub phash_distance: u32,
    /// Cover-crop to the exact tier box instead of fitting inside it
    pub exact: bool,
    /// Use ranged, resumable downloads through a staging file
    pub resumable: bool,
    /// Hosts fetched without probing
    pub archive_hosts: HashSet<String>,
    pub aliases: HostAliases,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            dup_mode: DupMode::Content,
            dup_action: DupAction::Link,
            derive_mode: DeriveMode::Prefer,
            phash_distance: DEFAULT_PHASH_DISTANCE,
            exact: false,
            resumable: true,
            archive_hosts: HashSet::new(),
            aliases: HostAliases::default(),
        }
    }
}

impl AcquirerConfig {
    pub fn is_archive(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| self.archive_hosts.contains(&host.to_ascii_lowercase()))
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.phash_distance > 64 {
            return Err(ConfigError::invalid(
                "acquisition.phash_distance",
                self.phash_distance.to_string(),
                "a 64-bit hash cannot differ in more than 64 bits",
            ));
        }
        Ok(())
    }
}
