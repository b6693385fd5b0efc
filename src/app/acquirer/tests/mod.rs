//! Per-tier state machine scenarios against a mock server

use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::app::client::TransportConfig;
use crate::app::models::HostAliases;
use crate::app::source::DenyHosts;
use crate::app::test_support::jpeg_bytes;

struct Harness {
    dir: TempDir,
    server: MockServer,
    acquirer: Acquirer,
}

impl Harness {
    async fn new(config: AcquirerConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let acquirer = build(&dir, config);
        Self {
            dir,
            server,
            acquirer,
        }
    }

    fn url(&self, p: &str) -> Url {
        Url::parse(&format!("{}{}", self.server.uri(), p)).unwrap()
    }

    fn item(&self, source: &str, id: &str, p: &str) -> CandidateItem {
        CandidateItem::new(source, id, self.url(p)).with_title(format!("Photo {}", id))
    }

    async fn serve(&self, p: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    async fn run(&self, item: CandidateItem, tiers: &[ResolutionTier]) -> ItemReport {
        let task = AcquisitionTask::new(Arc::new(item), tiers);
        self.acquirer.process(&task).await
    }
}

fn build(dir: &TempDir, config: AcquirerConfig) -> Acquirer {
    let transport = Arc::new(Transport::with_config(TransportConfig::fast()).unwrap());
    let ledger = Arc::new(Ledger::open(dir.path().join("ledger.sqlite3")).unwrap());
    Acquirer::new(transport, ledger, PathLayout::new(dir.path()), config)
}

#[tokio::test]
async fn test_falls_back_to_next_suffix_after_404() {
    let h = Harness::new(AcquirerConfig::default()).await;
    let body = jpeg_bytes(192, 120, 1);
    h.serve("/img/pic_1920x1200.jpg", body.clone()).await;

    let item = h.item("feed", "pic", "/img/pic_UHD.jpg");
    let report = h.run(item.clone(), &[ResolutionTier::Medium]).await;

    let outcome = report.outcome(ResolutionTier::Medium).unwrap();
    assert_eq!(
        outcome,
        &TierOutcome::Downloaded {
            url: h.url("/img/pic_1920x1200.jpg").to_string(),
            bytes: body.len() as u64,
        }
    );
    let primary = h.acquirer.primary_path(&item, ResolutionTier::Medium);
    assert_eq!(std::fs::read(&primary).unwrap(), body);

    let key = AcquisitionKey::for_item(&item, ResolutionTier::Medium, &HostAliases::default());
    let record = h.acquirer.ledger().get(&key).unwrap().unwrap();
    assert_eq!(record.url, h.url("/img/pic_1920x1200.jpg").to_string());
    assert_eq!((record.width, record.height), (192, 120));
    // Staging leftovers are cleaned up
    let staging = h.acquirer.layout().staging_dir();
    assert_eq!(std::fs::read_dir(staging).unwrap().count(), 0);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let h = Harness::new(AcquirerConfig::default()).await;
    h.serve("/a.jpg", jpeg_bytes(64, 48, 2)).await;
    let item = h.item("feed", "a", "/a.jpg");

    let first = h.run(item.clone(), &[ResolutionTier::Low]).await;
    assert!(matches!(
        first.outcome(ResolutionTier::Low),
        Some(TierOutcome::Downloaded { .. })
    ));

    h.server.reset().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let second = h.run(item, &[ResolutionTier::Low]).await;
    assert_eq!(
        second.outcome(ResolutionTier::Low),
        Some(&TierOutcome::AlreadyPresent)
    );
    assert_eq!(h.acquirer.ledger().len(), 1);
}

#[tokio::test]
async fn test_derives_lower_tier_from_disk_without_network() {
    let h = Harness::new(AcquirerConfig::default()).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let item = h
        .item("daily", "fox", "/th/OHR.Fox_UHD.jpg")
        .with_date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), Some("en-US".into()));
    let high = h.acquirer.primary_path(&item, ResolutionTier::High);
    std::fs::create_dir_all(high.parent().unwrap()).unwrap();
    std::fs::write(&high, jpeg_bytes(2800, 1200, 3)).unwrap();

    let report = h.run(item.clone(), &[ResolutionTier::Medium]).await;
    assert_eq!(
        report.outcome(ResolutionTier::Medium),
        Some(&TierOutcome::Derived {
            from: ResolutionTier::High,
            bytes: std::fs::metadata(h.acquirer.primary_path(&item, ResolutionTier::Medium))
                .unwrap()
                .len(),
        })
    );
    let medium = std::fs::read(h.acquirer.primary_path(&item, ResolutionTier::Medium)).unwrap();
    assert_eq!(image_dimensions(&medium), Some((2560, 1097)));
}

#[tokio::test]
async fn test_high_tier_on_disk_is_recorded_and_reused() {
    let h = Harness::new(AcquirerConfig::default()).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let item = h.item("feed", "lake", "/lake.jpg");
    let high = h.acquirer.primary_path(&item, ResolutionTier::High);
    std::fs::create_dir_all(high.parent().unwrap()).unwrap();
    std::fs::write(&high, jpeg_bytes(300, 200, 4)).unwrap();

    let report = h
        .run(item.clone(), &[ResolutionTier::High, ResolutionTier::Low])
        .await;
    assert_eq!(
        report.outcome(ResolutionTier::High),
        Some(&TierOutcome::AlreadyPresent)
    );
    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::Derived { from: ResolutionTier::High, .. })
    ));

    // The interrupted-run file now has a ledger record
    let key = AcquisitionKey::for_item(&item, ResolutionTier::High, &HostAliases::default());
    assert!(h.acquirer.ledger().exists(&key));
}

#[tokio::test]
async fn test_replayed_etag_yields_not_modified() {
    let h = Harness::new(AcquirerConfig::default()).await;
    let body = jpeg_bytes(80, 60, 5);
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .and(header("If-None-Match", "\"abc\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("ETag", "\"abc\""),
        )
        .mount(&h.server)
        .await;

    let first_item = h.item("alpha", "1", "/shared.jpg");
    let first = h.run(first_item.clone(), &[ResolutionTier::Low]).await;
    assert!(matches!(
        first.outcome(ResolutionTier::Low),
        Some(TierOutcome::Downloaded { .. })
    ));
    let primary = h.acquirer.primary_path(&first_item, ResolutionTier::Low);
    let modified = std::fs::metadata(&primary).unwrap().modified().unwrap();

    let second_item = h.item("beta", "1", "/shared.jpg");
    let second = h.run(second_item.clone(), &[ResolutionTier::Low]).await;
    assert_eq!(
        second.outcome(ResolutionTier::Low),
        Some(&TierOutcome::NotModified {
            url: h.url("/shared.jpg").to_string()
        })
    );
    assert_eq!(h.acquirer.ledger().len(), 1);
    assert!(!h.acquirer.primary_path(&second_item, ResolutionTier::Low).exists());
    assert_eq!(std::fs::metadata(&primary).unwrap().modified().unwrap(), modified);
}

#[tokio::test]
async fn test_content_duplicate_is_linked() {
    let h = Harness::new(AcquirerConfig::default()).await;
    let body = jpeg_bytes(96, 64, 6);
    h.serve("/one.jpg", body.clone()).await;
    h.serve("/two.jpg", body.clone()).await;

    let first = h.item("alpha", "1", "/one.jpg").with_title("Mountain view");
    let second = h.item("beta", "2", "/two.jpg").with_title("Fox portrait");
    h.run(first.clone(), &[ResolutionTier::Low]).await;
    let report = h.run(second.clone(), &[ResolutionTier::Low]).await;

    let existing = h.acquirer.primary_path(&first, ResolutionTier::Low);
    assert_eq!(
        report.outcome(ResolutionTier::Low),
        Some(&TierOutcome::DuplicateLinked {
            existing: existing.clone()
        })
    );
    assert!(!h.acquirer.primary_path(&second, ResolutionTier::Low).exists());

    let file_name = existing.file_name().unwrap();
    let nature = h.dir.path().join("1k/nature").join(file_name);
    let animals = h.dir.path().join("1k/animals").join(file_name);
    assert_eq!(std::fs::read(nature).unwrap(), body);
    assert_eq!(std::fs::read(animals).unwrap(), body);

    let key = AcquisitionKey::for_item(&second, ResolutionTier::Low, &HostAliases::default());
    let record = h.acquirer.ledger().get(&key).unwrap().unwrap();
    assert_eq!(record.path, existing);
    assert_eq!(h.acquirer.ledger().stats().unwrap().distinct_content, 1);
}

#[tokio::test]
async fn test_skip_action_discards_duplicate() {
    let config = AcquirerConfig {
        dup_action: DupAction::Skip,
        ..Default::default()
    };
    let h = Harness::new(config).await;
    let body = jpeg_bytes(50, 50, 7);
    h.serve("/one.jpg", body.clone()).await;
    h.serve("/two.jpg", body).await;

    h.run(h.item("alpha", "1", "/one.jpg"), &[ResolutionTier::Low])
        .await;
    let report = h
        .run(h.item("beta", "2", "/two.jpg"), &[ResolutionTier::Low])
        .await;

    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::DuplicateSkipped { .. })
    ));
    assert_eq!(h.acquirer.ledger().len(), 1);
}

#[tokio::test]
async fn test_keep_action_and_url_mode_store_copies() {
    for config in [
        AcquirerConfig {
            dup_action: DupAction::Keep,
            ..Default::default()
        },
        AcquirerConfig {
            dup_mode: DupMode::Url,
            ..Default::default()
        },
    ] {
        let h = Harness::new(config).await;
        let body = jpeg_bytes(40, 40, 8);
        h.serve("/one.jpg", body.clone()).await;
        h.serve("/two.jpg", body).await;

        h.run(h.item("alpha", "1", "/one.jpg"), &[ResolutionTier::Low])
            .await;
        let second = h.item("beta", "2", "/two.jpg");
        let report = h.run(second.clone(), &[ResolutionTier::Low]).await;

        assert!(matches!(
            report.outcome(ResolutionTier::Low),
            Some(TierOutcome::Downloaded { .. })
        ));
        assert!(h.acquirer.primary_path(&second, ResolutionTier::Low).exists());
        assert_eq!(h.acquirer.ledger().len(), 2);
    }
}

#[tokio::test]
async fn test_perceptual_duplicate_detected() {
    let config = AcquirerConfig {
        dup_mode: DupMode::Perceptual,
        dup_action: DupAction::Skip,
        ..Default::default()
    };
    let h = Harness::new(config).await;
    // Same picture at two sizes: different bytes, same fingerprint
    h.serve("/big.jpg", jpeg_bytes(320, 240, 9)).await;
    h.serve("/small.jpg", jpeg_bytes(160, 120, 9)).await;

    h.run(h.item("alpha", "1", "/big.jpg"), &[ResolutionTier::Low])
        .await;
    let report = h
        .run(h.item("beta", "2", "/small.jpg"), &[ResolutionTier::Low])
        .await;

    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::DuplicateSkipped { .. })
    ));
    assert_eq!(h.acquirer.ledger().stats().unwrap().with_perceptual, 1);
}

#[tokio::test]
async fn test_robots_denied_url_fails_tier() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let acquirer = build(&dir, AcquirerConfig::default())
        .with_robots(Arc::new(DenyHosts::new(["127.0.0.1", "localhost"])));

    let url = Url::parse(&format!("{}/x.jpg", server.uri())).unwrap();
    let task = AcquisitionTask::new(
        Arc::new(CandidateItem::new("feed", "x", url)),
        &[ResolutionTier::Low],
    );
    let report = acquirer.process(&task).await;
    match report.outcome(ResolutionTier::Low) {
        Some(TierOutcome::Failed { reason }) => assert!(reason.contains("Robots policy denies")),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_archive_hosts_skip_probe() {
    let dir = TempDir::new().unwrap();
    let server = MockServer::start().await;
    let host = Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(jpeg_bytes(30, 20, 10)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = AcquirerConfig {
        resumable: false,
        ..Default::default()
    };
    config.archive_hosts.insert(host);
    let acquirer = build(&dir, config);

    let url = Url::parse(&format!("{}/archive.jpg", server.uri())).unwrap();
    let task = AcquisitionTask::new(
        Arc::new(CandidateItem::new("feed", "a", url)),
        &[ResolutionTier::Low],
    );
    let report = acquirer.process(&task).await;
    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::Downloaded { .. })
    ));
}

#[tokio::test]
async fn test_fallback_mode_tries_network_before_deriving() {
    let config = AcquirerConfig {
        derive_mode: DeriveMode::Fallback,
        ..Default::default()
    };
    let h = Harness::new(config).await;
    h.serve("/img/sky_UHD.jpg", jpeg_bytes(400, 300, 11)).await;

    let report = h
        .run(
            h.item("feed", "sky", "/img/sky_UHD.jpg"),
            &[ResolutionTier::High, ResolutionTier::Low],
        )
        .await;
    assert!(matches!(
        report.outcome(ResolutionTier::High),
        Some(TierOutcome::Downloaded { .. })
    ));
    // `_1920x1080` is not served, so the low tier is derived
    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::Derived { from: ResolutionTier::High, .. })
    ));
}

#[tokio::test]
async fn test_derive_off_reports_failure() {
    let config = AcquirerConfig {
        derive_mode: DeriveMode::Off,
        ..Default::default()
    };
    let h = Harness::new(config).await;
    h.serve("/img/sky_UHD.jpg", jpeg_bytes(400, 300, 12)).await;

    let report = h
        .run(
            h.item("feed", "sky", "/img/sky_UHD.jpg"),
            &[ResolutionTier::High, ResolutionTier::Low],
        )
        .await;
    assert!(report.has_failures());
    assert!(report
        .outcome(ResolutionTier::Low)
        .is_some_and(TierOutcome::is_failure));
}

#[tokio::test]
async fn test_oversized_download_is_normalized() {
    let h = Harness::new(AcquirerConfig::default()).await;
    h.serve("/wide.jpg", jpeg_bytes(2400, 1000, 13)).await;

    let item = h.item("feed", "wide", "/wide.jpg");
    h.run(item.clone(), &[ResolutionTier::Low]).await;

    let stored = std::fs::read(h.acquirer.primary_path(&item, ResolutionTier::Low)).unwrap();
    assert_eq!(image_dimensions(&stored), Some((1920, 800)));
}

#[tokio::test]
async fn test_same_title_items_are_stored_separately() {
    let h = Harness::new(AcquirerConfig::default()).await;
    let one = jpeg_bytes(64, 48, 14);
    let two = jpeg_bytes(64, 48, 15);
    h.serve("/one.jpg", one.clone()).await;
    h.serve("/two.jpg", two.clone()).await;

    let first = h.item("feed", "1", "/one.jpg").with_title("Sunset");
    let second = h.item("feed", "2", "/two.jpg").with_title("Sunset");
    h.run(first.clone(), &[ResolutionTier::Low]).await;
    let report = h.run(second.clone(), &[ResolutionTier::Low]).await;

    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::Downloaded { .. })
    ));
    let first_path = h.acquirer.primary_path(&first, ResolutionTier::Low);
    let second_path = h.acquirer.primary_path(&second, ResolutionTier::Low);
    assert_ne!(first_path, second_path);
    assert_eq!(std::fs::read(&first_path).unwrap(), one);
    assert_eq!(std::fs::read(&second_path).unwrap(), two);

    let key = AcquisitionKey::for_item(&second, ResolutionTier::Low, &HostAliases::default());
    let record = h.acquirer.ledger().get(&key).unwrap().unwrap();
    assert_eq!(record.content_hash, ContentHash::of(&two));
    assert_eq!(record.path, second_path);
}

#[tokio::test]
async fn test_file_owned_by_another_key_is_never_claimed() {
    let h = Harness::new(AcquirerConfig::default()).await;
    let us = jpeg_bytes(64, 48, 16);
    h.serve("/us.jpg", us.clone()).await;
    h.serve("/de.jpg", jpeg_bytes(64, 48, 17)).await;

    // Same date and title in two markets share one dated primary path
    let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    let first = h
        .item("daily", "us", "/us.jpg")
        .with_title("Harbour")
        .with_date(date, Some("en-US".into()));
    let second = h
        .item("daily", "de", "/de.jpg")
        .with_title("Harbour")
        .with_date(date, Some("de-DE".into()));
    let primary = h.acquirer.primary_path(&first, ResolutionTier::Low);
    assert_eq!(primary, h.acquirer.primary_path(&second, ResolutionTier::Low));

    h.run(first, &[ResolutionTier::Low]).await;
    let report = h.run(second.clone(), &[ResolutionTier::Low]).await;

    match report.outcome(ResolutionTier::Low) {
        Some(TierOutcome::Failed { reason }) => {
            assert!(reason.contains("already holds different content"))
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(std::fs::read(&primary).unwrap(), us);
    let key = AcquisitionKey::for_item(&second, ResolutionTier::Low, &HostAliases::default());
    assert!(!h.acquirer.ledger().exists(&key));
    assert_eq!(h.acquirer.ledger().len(), 1);
}

#[tokio::test]
async fn test_refetched_url_fills_missing_validators() {
    let h = Harness::new(AcquirerConfig::default()).await;
    let body = jpeg_bytes(72, 48, 18);
    // Existence checks carry a Range header
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .and(wiremock::matchers::header_exists("Range"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .with_priority(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shared.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .insert_header("ETag", "\"v2\""),
        )
        .with_priority(3)
        .mount(&h.server)
        .await;

    let first = h.item("alpha", "1", "/shared.jpg");
    h.run(first.clone(), &[ResolutionTier::Low]).await;
    let first_key = AcquisitionKey::for_item(&first, ResolutionTier::Low, &HostAliases::default());
    assert!(h.acquirer.ledger().lookup_headers(&first_key).unwrap().is_empty());

    let report = h
        .run(h.item("beta", "1", "/shared.jpg"), &[ResolutionTier::Low])
        .await;
    assert!(matches!(
        report.outcome(ResolutionTier::Low),
        Some(TierOutcome::DuplicateLinked { .. })
    ));
    assert_eq!(
        h.acquirer.ledger().lookup_headers(&first_key).unwrap().etag,
        Some("\"v2\"".to_string())
    );
}
