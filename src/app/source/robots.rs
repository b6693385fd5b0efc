//! Robots policy consumed as a boolean gate

use std::collections::HashSet;
use std::fmt::Debug;

use url::Url;

/// Decides whether a URL may be fetched at all
pub trait RobotsGate: Debug + Send + Sync {
    fn allowed(&self, url: &Url) -> bool;
}

/// Gate that permits everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RobotsGate for AllowAll {
    fn allowed(&self, _url: &Url) -> bool {
        true
    }
}

/// Denies listed hosts and their subdomains
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyHosts {
    hosts: HashSet<String>,
}

impl DenyHosts {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }
}

impl RobotsGate for DenyHosts {
    fn allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_ascii_lowercase();
        !self.hosts.iter().any(|denied| {
            host == *denied
                || host
                    .strip_suffix(denied.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}
