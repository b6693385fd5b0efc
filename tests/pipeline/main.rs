//! End-to-end runs: feeds on disk, images from a mock server, a real ledger

mod support;

use serde_json::json;
use wallpaper_fetcher::app::client::partial_path;
use wallpaper_fetcher::app::{AcquisitionKey, HostAliases, ResolutionTier};
use wiremock::matchers::{any, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{jpeg, Pipeline};

async fn serve(server: &MockServer, p: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_rerun_is_idempotent_and_offline() {
    let server = MockServer::start().await;
    serve(&server, "/a.jpg", jpeg(120, 80, 1)).await;
    serve(&server, "/b.jpg", jpeg(120, 80, 2)).await;

    let mut pipeline = Pipeline::new(&[ResolutionTier::Low]);
    pipeline.add_feed(
        "local",
        json!({
            "items": [
                { "id": "a", "url": format!("{}/a.jpg", server.uri()), "title": "Forest" },
                { "id": "b", "url": format!("{}/b.jpg", server.uri()), "title": "Harbour" }
            ]
        }),
    );

    let (first, ledger) = pipeline.run().await;
    assert_eq!(first.items, 2);
    assert_eq!(first.downloaded, 2);
    assert_eq!(ledger.len(), 2);
    drop(ledger);
    let files_before = pipeline.image_files();
    assert!(files_before.len() >= 2);

    server.reset().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (second, ledger) = pipeline.run().await;
    assert_eq!(second.items, 2);
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.already_present, 2);
    assert_eq!(second.failed, 0);
    assert_eq!(ledger.len(), 2);
    assert_eq!(pipeline.image_files(), files_before);
}

#[tokio::test]
async fn test_identical_content_across_feeds_is_stored_once() {
    let server = MockServer::start().await;
    let body = jpeg(100, 60, 3);
    serve(&server, "/north/peak.jpg", body.clone()).await;
    serve(&server, "/south/fox.jpg", body.clone()).await;

    let mut pipeline = Pipeline::new(&[ResolutionTier::Low]);
    pipeline.add_feed(
        "north",
        json!([{ "id": "1", "url": format!("{}/north/peak.jpg", server.uri()), "title": "Mountain peak" }]),
    );
    pipeline.add_feed(
        "south",
        json!([{ "id": "2", "url": format!("{}/south/fox.jpg", server.uri()), "title": "Red fox" }]),
    );

    let (summary, ledger) = pipeline.run().await;
    assert_eq!(summary.items, 2);
    assert_eq!(ledger.len(), 2);
    assert_eq!(ledger.stats().unwrap().distinct_content, 1);

    let root = pipeline.root();
    let primaries: Vec<_> = pipeline
        .image_files()
        .into_keys()
        .filter(|p| p.starts_with(root.join("1k/north")) || p.starts_with(root.join("1k/south")))
        .collect();
    assert_eq!(primaries.len(), 1);

    let file_name = primaries[0].file_name().unwrap();
    assert_eq!(std::fs::read(root.join("1k/nature").join(file_name)).unwrap(), body);
    assert_eq!(std::fs::read(root.join("1k/animals").join(file_name)).unwrap(), body);
}

#[tokio::test]
async fn test_lower_tier_derived_from_disk_without_network() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut pipeline = Pipeline::new(&[ResolutionTier::Medium]);
    pipeline.add_feed(
        "daily",
        json!({
            "chain_tiers": true,
            "items": [{
                "id": "otter",
                "url": format!("{}/th/OHR.Otter_UHD.jpg", server.uri()),
                "title": "Sea otter",
                "date": "2024-03-05",
                "market": "en-GB"
            }]
        }),
    );

    let tasks = pipeline.tasks().await;
    assert_eq!(tasks.len(), 1);
    let item = tasks[0].item.clone();
    let high = pipeline.layout().primary_path(&item, ResolutionTier::High);
    std::fs::create_dir_all(high.parent().unwrap()).unwrap();
    std::fs::write(&high, jpeg(3840, 2160, 4)).unwrap();

    let (summary, ledger) = pipeline.run().await;
    assert_eq!(summary.downloaded, 0);
    assert_eq!(summary.derived, 1);

    let key = AcquisitionKey::for_item(&item, ResolutionTier::Medium, &HostAliases::default());
    let record = ledger.get(&key).unwrap().unwrap();
    assert_eq!((record.width, record.height), (2560, 1440));
    assert_eq!(
        record.path,
        pipeline.layout().primary_path(&item, ResolutionTier::Medium)
    );
    assert!(record.path.exists());
}

#[tokio::test]
async fn test_interrupted_download_resumes_from_partial_file() {
    let server = MockServer::start().await;
    let body = jpeg(200, 150, 5);
    let offset = body.len() / 2;

    Mock::given(method("GET"))
        .and(path("/resume.jpg"))
        .and(header("Range", format!("bytes={}-", offset).as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(body[offset..].to_vec())
                .insert_header(
                    "Content-Range",
                    format!("bytes {}-{}/{}", offset, body.len() - 1, body.len()).as_str(),
                ),
        )
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    serve(&server, "/resume.jpg", body.clone()).await;

    let mut pipeline = Pipeline::new(&[ResolutionTier::High]);
    pipeline.add_feed(
        "local",
        json!([{ "id": "r", "url": format!("{}/resume.jpg", server.uri()), "title": "Dunes" }]),
    );

    let tasks = pipeline.tasks().await;
    let item = tasks[0].item.clone();
    let key = AcquisitionKey::for_item(&item, ResolutionTier::High, &HostAliases::default());
    let staging = pipeline.layout().staging_path(&key, &item.url);
    let part = partial_path(&staging);
    std::fs::create_dir_all(part.parent().unwrap()).unwrap();
    std::fs::write(&part, &body[..offset]).unwrap();

    let (summary, ledger) = pipeline.run().await;
    assert_eq!(summary.downloaded, 1);
    assert_eq!(ledger.len(), 1);

    let primary = pipeline.layout().primary_path(&item, ResolutionTier::High);
    assert_eq!(std::fs::read(&primary).unwrap(), body);
    assert!(!part.exists());
    assert!(matches!(
        ledger.get(&key).unwrap().map(|r| r.size),
        Some(size) if size == body.len() as u64
    ));
}
