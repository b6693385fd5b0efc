//! Source collection and JSON feed behaviour

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::app::client::{Transport, TransportConfig};
use crate::errors::{SourceError, SourceResult};

#[derive(Debug)]
struct StaticSource {
    name: &'static str,
    count: usize,
    chained: bool,
}

#[async_trait]
impl CandidateSource for StaticSource {
    fn name(&self) -> &str {
        self.name
    }

    fn chains_tiers(&self) -> bool {
        self.chained
    }

    async fn search(
        &self,
        _query: &str,
        width: u32,
        _height: u32,
        limit: usize,
        _options: &SearchOptions,
    ) -> SourceResult<Vec<CandidateItem>> {
        Ok((0..self.count.min(limit))
            .map(|n| {
                let url = Url::parse(&format!("https://{}.example.com/{}_{}.jpg", self.name, n, width))
                    .unwrap();
                CandidateItem::new("ignored", n.to_string(), url)
            })
            .collect())
    }
}

#[derive(Debug)]
struct BrokenSource;

#[async_trait]
impl CandidateSource for BrokenSource {
    fn name(&self) -> &str {
        "broken"
    }

    async fn search(
        &self,
        _query: &str,
        _width: u32,
        _height: u32,
        _limit: usize,
        _options: &SearchOptions,
    ) -> SourceResult<Vec<CandidateItem>> {
        Err(SourceError::Failed {
            source_name: "broken".to_string(),
            reason: "offline".to_string(),
        })
    }
}

fn request(tiers: &[ResolutionTier], limit: usize) -> CollectRequest {
    CollectRequest {
        query: String::new(),
        tiers: tiers.to_vec(),
        limit_per_source: limit,
        extra: Default::default(),
    }
}

#[tokio::test]
async fn test_groups_per_source_and_tier() {
    let sources: Vec<Arc<dyn CandidateSource>> = vec![
        Arc::new(StaticSource { name: "a", count: 3, chained: false }),
        Arc::new(BrokenSource),
        Arc::new(StaticSource { name: "b", count: 10, chained: true }),
    ];
    let groups = collect_groups(
        &sources,
        &request(&[ResolutionTier::Low, ResolutionTier::High], 4),
    )
    .await;

    let labels: Vec<String> = groups.iter().map(TaskGroup::label).collect();
    assert_eq!(labels, vec!["a/4k", "a/1k", "broken/4k", "broken/1k", "b/*"]);
    assert_eq!(groups[0].len(), 3);
    assert!(groups[2].is_empty());
    assert_eq!(groups[4].len(), 4);

    // Items take the source's name and chained tasks carry every tier
    assert!(groups[0].tasks.iter().all(|t| t.item.source == "a"));
    assert_eq!(
        groups[4].tasks[0].tiers,
        vec![ResolutionTier::High, ResolutionTier::Low]
    );
    assert_eq!(groups[1].tasks[0].tiers, vec![ResolutionTier::Low]);
    // Per-tier searches target the tier's box
    assert!(groups[1].tasks[0].item.url.path().ends_with("_1920.jpg"));
}

#[tokio::test]
async fn test_feed_from_file_filters_and_limits() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("feed.json");
    std::fs::write(
        &file,
        serde_json::json!({
            "chain_tiers": true,
            "items": [
                { "id": "fox", "url": "https://img.example.com/fox_UHD.jpg",
                  "title": "Red fox", "date": "20240107", "market": "en-US" },
                { "url": "not a url", "title": "Broken fox" },
                { "url": "https://img.example.com/lake.jpg", "title": "Lake",
                  "tags": ["fox country"], "width": 1920, "height": 1080 },
                { "url": "https://img.example.com/city.jpg", "title": "City" }
            ]
        })
        .to_string(),
    )
    .unwrap();

    let source = FeedSource::from_file("daily", &file).detect_chain_tiers().await;
    assert!(source.chains_tiers());

    let items = source
        .search("FOX", 3840, 2160, 10, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].source_id, "fox");
    assert_eq!(items[0].logical_key().as_deref(), Some("en-US:2024-01-07"));
    assert_eq!(items[1].source_id, "2");
    assert_eq!(items[1].width, Some(1920));

    let limited = source
        .search("", 3840, 2160, 1, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_missing_feed_file_is_an_error() {
    let source = FeedSource::from_file("gone", "/nonexistent/feed.json");
    let result = source
        .search("", 1, 1, 10, &SearchOptions::default())
        .await;
    assert!(matches!(result, Err(SourceError::Read { .. })));
}

#[tokio::test]
async fn test_remote_feed_passes_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.json"))
        .and(query_param("q", "lake"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "1", "url": "https://img.example.com/lake.jpg", "title": "Lake" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let transport = Arc::new(Transport::with_config(TransportConfig::fast()).unwrap());
    let location = FeedLocation::parse(&format!("{}/feed.json", server.uri()));
    let source = FeedSource::new("remote", location, transport);
    let items = source
        .search("lake", 1920, 1080, 5, &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].source, "remote");
    assert!(!source.chains_tiers());
}
