//! Candidate URL construction per tier

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::app::models::{HostAliases, ResolutionTier};

fn size_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*?)_(UHD|\d+x\d+)\.jpg(.*)$").expect("valid suffix pattern"))
}

/// Rewrite a `<stem>_<UHD|WxH>.jpg<rest>` URL to another size suffix
pub fn swap_suffix(url: &Url, suffix: &str) -> Option<Url> {
    let captures = size_suffix().captures(url.as_str())?;
    let rewritten = format!("{}_{}.jpg{}", &captures[1], suffix, &captures[3]);
    Url::parse(&rewritten).ok()
}

/// URLs to try for `tier`, highest fidelity first
///
/// Size-suffixed URLs expand to one URL per tier suffix; anything else is
/// tried as-is. Hosts are normalized and duplicates dropped.
pub fn candidate_urls(url: &Url, tier: ResolutionTier, aliases: &HostAliases) -> Vec<Url> {
    let expanded: Vec<Url> = if size_suffix().is_match(url.as_str()) {
        tier.suffixes()
            .iter()
            .filter_map(|suffix| swap_suffix(url, suffix))
            .collect()
    } else {
        vec![url.clone()]
    };

    let mut candidates: Vec<Url> = Vec::with_capacity(expanded.len());
    for candidate in expanded {
        let candidate = aliases.normalize(&candidate);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}
