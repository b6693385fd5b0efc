//! Ledger persistence and query tests

use std::path::PathBuf;

use tempfile::TempDir;

use super::*;
use crate::app::hash::{ContentHash, PerceptualHash};
use crate::app::models::{AcquisitionKey, CacheValidators, LedgerRecord, ResolutionTier};

fn record(source: &str, identity: &str, bytes: &[u8]) -> LedgerRecord {
    LedgerRecord {
        key: AcquisitionKey::new(source, ResolutionTier::Low, identity),
        url: format!("https://img.example.com/{}.jpg", identity),
        path: PathBuf::from(format!("1k/{}/{}.jpg", source, identity)),
        size: bytes.len() as u64,
        width: 1920,
        height: 1080,
        content_hash: ContentHash::of(bytes),
        perceptual_hash: None,
        etag: None,
        last_modified: None,
        metadata: serde_json::json!({ "title": identity }),
    }
}

#[test]
fn test_commit_is_idempotent() {
    let ledger = Ledger::in_memory().unwrap();
    let first = record("feed", "a", b"one");

    assert!(!ledger.exists(&first.key));
    assert!(ledger.commit(&first).unwrap());
    assert!(ledger.exists(&first.key));

    let mut conflicting = first.clone();
    conflicting.path = PathBuf::from("elsewhere.jpg");
    assert!(!ledger.commit(&conflicting).unwrap());

    let stored = ledger.get(&first.key).unwrap().unwrap();
    assert_eq!(stored, first);
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_reopen_reloads_index() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/ledger.sqlite3");
    let mut rec = record("feed", "b", b"two");
    rec.perceptual_hash = Some(PerceptualHash::from_bits(0xF0F0_0000_0000_0001));

    {
        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.commit(&rec).unwrap());
    }

    let reopened = Ledger::open(&path).unwrap();
    assert_eq!(reopened.path(), Some(path.as_path()));
    assert!(reopened.exists(&rec.key));
    assert!(reopened.content_hash_seen(&rec.content_hash));
    assert!(reopened.path_recorded(&rec.path));
    assert!(!reopened.path_recorded(std::path::Path::new("1k/feed/other.jpg")));
    assert!(reopened.perceptual_match(&PerceptualHash::from_bits(0xF0F0_0000_0000_0003), 2));
    assert_eq!(
        schema::current_version(&rusqlite::Connection::open(&path).unwrap()).unwrap(),
        SCHEMA_VERSION
    );
}

#[test]
fn test_shared_content_under_distinct_keys() {
    let ledger = Ledger::in_memory().unwrap();
    let a = record("alpha", "x", b"same bytes");
    let b = record("beta", "y", b"same bytes");

    assert!(ledger.commit(&a).unwrap());
    assert!(ledger.commit(&b).unwrap());
    assert_eq!(ledger.len(), 2);

    let found = ledger.find_by_content_hash(&a.content_hash).unwrap().unwrap();
    assert_eq!(found.key, a.key);
    assert!(ledger
        .find_by_content_hash(&ContentHash::of(b"unknown"))
        .unwrap()
        .is_none());
}

#[test]
fn test_find_perceptual_match_returns_nearest_record() {
    let ledger = Ledger::in_memory().unwrap();
    let mut far = record("feed", "far", b"far");
    far.perceptual_hash = Some(PerceptualHash::from_bits(0x0000_0000_0000_00FF));
    let mut near = record("feed", "near", b"near");
    near.perceptual_hash = Some(PerceptualHash::from_bits(0x0000_0000_0000_0001));
    ledger.commit(&far).unwrap();
    ledger.commit(&near).unwrap();

    let probe = PerceptualHash::from_bits(0x0000_0000_0000_0003);
    let found = ledger.find_perceptual_match(&probe, 5).unwrap().unwrap();
    assert_eq!(found.key, near.key);
    assert!(ledger
        .find_perceptual_match(&PerceptualHash::from_bits(u64::MAX), 5)
        .unwrap()
        .is_none());
}

#[test]
fn test_amend_validators_only_fills_gaps() {
    let ledger = Ledger::in_memory().unwrap();
    let mut rec = record("feed", "c", b"three");
    rec.etag = Some("\"v1\"".to_string());
    ledger.commit(&rec).unwrap();

    let changed = ledger
        .amend_validators(
            &rec.key,
            &CacheValidators {
                etag: Some("\"v2\"".to_string()),
                last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".to_string()),
            },
        )
        .unwrap();
    assert!(changed);

    let headers = ledger.lookup_headers(&rec.key).unwrap();
    assert_eq!(headers.etag.as_deref(), Some("\"v1\""));
    assert_eq!(
        headers.last_modified.as_deref(),
        Some("Wed, 21 Oct 2015 07:28:00 GMT")
    );

    // Nothing left to fill
    assert!(!ledger
        .amend_validators(
            &rec.key,
            &CacheValidators {
                etag: Some("\"v3\"".to_string()),
                last_modified: None,
            },
        )
        .unwrap());
    assert!(!ledger
        .amend_validators(&rec.key, &CacheValidators::default())
        .unwrap());
}

#[test]
fn test_lookup_headers_for_url_uses_latest_row() {
    let ledger = Ledger::in_memory().unwrap();
    let mut old = record("feed", "d", b"old");
    old.url = "https://img.example.com/shared.jpg".to_string();
    old.etag = Some("\"old\"".to_string());
    let mut new = record("other", "d", b"new");
    new.url = old.url.clone();
    new.etag = Some("\"new\"".to_string());
    ledger.commit(&old).unwrap();
    ledger.commit(&new).unwrap();

    let headers = ledger.lookup_headers_for_url(&old.url).unwrap();
    assert_eq!(headers.etag.as_deref(), Some("\"new\""));
    assert!(ledger
        .lookup_headers_for_url("https://img.example.com/none.jpg")
        .unwrap()
        .is_empty());
}

#[test]
fn test_stats_counts() {
    let ledger = Ledger::in_memory().unwrap();
    let mut a = record("alpha", "1", b"aaa");
    a.etag = Some("\"e\"".to_string());
    let b = record("alpha", "2", b"aaa");
    let mut c = record("beta", "3", b"ccc");
    c.key.tier = ResolutionTier::High;
    c.perceptual_hash = Some(PerceptualHash::from_bits(7));
    for rec in [&a, &b, &c] {
        ledger.commit(rec).unwrap();
    }

    let stats = ledger.stats().unwrap();
    assert_eq!(stats.records, 3);
    assert_eq!(stats.distinct_content, 2);
    assert_eq!(stats.with_perceptual, 1);
    assert_eq!(stats.with_validators, 1);
    assert_eq!(stats.total_bytes, 9);
    assert_eq!(stats.by_tier.get("1k"), Some(&2));
    assert_eq!(stats.by_tier.get("4k"), Some(&1));
    assert_eq!(stats.by_source.get("alpha"), Some(&2));
    assert!(stats.to_string().contains("Records:"));
}
