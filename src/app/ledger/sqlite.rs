//! SQLite-backed ledger

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::app::hash::{ContentHash, PerceptualHash};
use crate::app::ledger::index::{LedgerIndex, index_key};
use crate::app::ledger::schema;
use crate::app::ledger::stats::LedgerStats;
use crate::app::models::{AcquisitionKey, CacheValidators, LedgerRecord, ResolutionTier};
use crate::errors::{LedgerError, LedgerResult};

const RECORD_COLUMNS: &str = "source, tier, identity, url, content_hash, path, size, width, \
     height, metadata, etag, last_modified, phash";

/// Columns as stored, before validation into a [`LedgerRecord`]
struct RawRow {
    source: String,
    tier: String,
    identity: String,
    url: String,
    content_hash: String,
    path: String,
    size: i64,
    width: i64,
    height: i64,
    metadata: String,
    etag: Option<String>,
    last_modified: Option<String>,
    phash: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source: row.get(0)?,
            tier: row.get(1)?,
            identity: row.get(2)?,
            url: row.get(3)?,
            content_hash: row.get(4)?,
            path: row.get(5)?,
            size: row.get(6)?,
            width: row.get(7)?,
            height: row.get(8)?,
            metadata: row.get(9)?,
            etag: row.get(10)?,
            last_modified: row.get(11)?,
            phash: row.get(12)?,
        })
    }

    fn into_record(self) -> LedgerResult<LedgerRecord> {
        let corrupt = |reason: String| LedgerError::CorruptRow {
            key: format!("{}:{}:{}", self.source, self.tier, self.identity),
            reason,
        };
        let tier: ResolutionTier = self.tier.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let content_hash = ContentHash::from_hex(&self.content_hash)
            .map_err(|e| corrupt(e.to_string()))?;
        let perceptual_hash = match &self.phash {
            Some(text) => Some(
                text.parse::<PerceptualHash>()
                    .map_err(|e| corrupt(e.to_string()))?,
            ),
            None => None,
        };
        let metadata = serde_json::from_str(&self.metadata)?;

        Ok(LedgerRecord {
            key: AcquisitionKey::new(self.source, tier, self.identity),
            url: self.url,
            path: PathBuf::from(self.path),
            size: self.size.max(0) as u64,
            width: self.width.max(0) as u32,
            height: self.height.max(0) as u32,
            content_hash,
            perceptual_hash,
            etag: self.etag,
            last_modified: self.last_modified,
            metadata,
        })
    }
}

/// Durable acquisition ledger with an in-memory existence index
///
/// Shared between workers behind an `Arc`. Database access is serialized by
/// one connection mutex; index reads only take a read lock.
#[derive(Debug)]
pub struct Ledger {
    conn: Mutex<Connection>,
    index: RwLock<LedgerIndex>,
    path: Option<PathBuf>,
}

impl Ledger {
    /// Open or create the ledger at `path`, migrate it and load the index
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the file cannot be opened, a migration
    /// fails or an existing row cannot be read.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|_| LedgerError::PathNotAccessible {
                path: parent.to_path_buf(),
            })?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(10))?;
        let ledger = Self::initialize(conn, Some(path.to_path_buf()))?;
        info!(
            "Opened ledger {} with {} records",
            path.display(),
            ledger.len()
        );
        Ok(ledger)
    }

    /// Creates an in-memory ledger for testing
    pub fn in_memory() -> LedgerResult<Self> {
        Self::initialize(Connection::open_in_memory()?, None)
    }

    fn initialize(mut conn: Connection, path: Option<PathBuf>) -> LedgerResult<Self> {
        schema::migrate(&mut conn)?;
        let index = Self::load_index(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            index: RwLock::new(index),
            path,
        })
    }

    fn load_index(conn: &Connection) -> LedgerResult<LedgerIndex> {
        let mut index = LedgerIndex::default();
        let mut stmt =
            conn.prepare("SELECT source, tier, key_hash, content_hash, phash, path FROM acquisitions")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        for row in rows {
            let (source, tier, key_hash, content_hash, phash, path) = row?;
            let corrupt = |reason: String| LedgerError::CorruptRow {
                key: format!("{}:{}:{}", source, tier, key_hash),
                reason,
            };
            let tier: ResolutionTier = tier.parse().map_err(|e| corrupt(format!("{}", e)))?;
            let content_hash =
                ContentHash::from_hex(&content_hash).map_err(|e| corrupt(e.to_string()))?;
            let phash = phash
                .map(|p| p.parse::<PerceptualHash>())
                .transpose()
                .map_err(|e| corrupt(e.to_string()))?;
            index.insert(
                (source, tier, key_hash),
                content_hash,
                phash,
                PathBuf::from(path),
            );
        }
        debug!("Loaded {} ledger keys into memory", index.len());
        Ok(index)
    }

    fn conn(&self) -> LedgerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    // The index is append-only, so a poisoned lock still guards consistent data
    fn index(&self) -> RwLockReadGuard<'_, LedgerIndex> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn index_mut(&self) -> RwLockWriteGuard<'_, LedgerIndex> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of recorded keys
    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    /// Memory-only check whether `key` has a record
    pub fn exists(&self, key: &AcquisitionKey) -> bool {
        self.index().contains(key)
    }

    /// Whether any record points at `path`
    pub fn path_recorded(&self, path: &Path) -> bool {
        self.index().holds_path(path)
    }

    /// Whether any record holds these exact bytes
    pub fn content_hash_seen(&self, hash: &ContentHash) -> bool {
        self.index().content_path(hash).is_some()
    }

    /// Whether any stored perceptual hash lies within `max_distance`
    pub fn perceptual_match(&self, hash: &PerceptualHash, max_distance: u32) -> bool {
        self.index().nearest_perceptual(hash, max_distance).is_some()
    }

    /// Insert `record` unless its key already exists
    ///
    /// Returns `false` for an existing key; the stored row is left untouched.
    pub fn commit(&self, record: &LedgerRecord) -> LedgerResult<bool> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let key_hash = record.key.key_hash();
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO acquisitions (
                source, tier, key_hash, identity, url, content_hash, path, size, width,
                height, metadata, etag, last_modified, phash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.key.source,
                record.key.tier.name(),
                key_hash,
                record.key.identity,
                record.url,
                record.content_hash.to_hex(),
                record.path.to_string_lossy(),
                record.size as i64,
                record.width,
                record.height,
                metadata,
                record.etag,
                record.last_modified,
                record.perceptual_hash.map(|p| p.to_string()),
                chrono::Utc::now().to_rfc3339(),
            ],
        )? == 1;

        if inserted {
            // Updated while the connection lock is held so index order follows commit order
            self.index_mut().insert(
                index_key(&record.key),
                record.content_hash,
                record.perceptual_hash,
                record.path.clone(),
            );
            debug!("Committed ledger record {}", record.key);
        } else {
            debug!("Ledger already holds {}, insert ignored", record.key);
        }
        Ok(inserted)
    }

    /// Fill in validators the record does not have yet
    ///
    /// Existing values are never replaced. Returns whether a row changed.
    pub fn amend_validators(
        &self,
        key: &AcquisitionKey,
        validators: &CacheValidators,
    ) -> LedgerResult<bool> {
        if validators.is_empty() {
            return Ok(false);
        }
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE acquisitions
                SET etag = COALESCE(etag, ?4),
                    last_modified = COALESCE(last_modified, ?5)
              WHERE source = ?1 AND tier = ?2 AND key_hash = ?3
                AND ((etag IS NULL AND ?4 IS NOT NULL)
                  OR (last_modified IS NULL AND ?5 IS NOT NULL))",
            params![
                key.source,
                key.tier.name(),
                key.key_hash(),
                validators.etag,
                validators.last_modified,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Full record for `key`
    pub fn get(&self, key: &AcquisitionKey) -> LedgerResult<Option<LedgerRecord>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM acquisitions WHERE source = ?1 AND tier = ?2 AND key_hash = ?3",
                    RECORD_COLUMNS
                ),
                params![key.source, key.tier.name(), key.key_hash()],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Validators recorded for `key`
    pub fn lookup_headers(&self, key: &AcquisitionKey) -> LedgerResult<CacheValidators> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT etag, last_modified FROM acquisitions
                  WHERE source = ?1 AND tier = ?2 AND key_hash = ?3",
                params![key.source, key.tier.name(), key.key_hash()],
                |row| {
                    Ok(CacheValidators {
                        etag: row.get(0)?,
                        last_modified: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(found.unwrap_or_default())
    }

    /// Validators from the most recent record fetched from `url`
    pub fn lookup_headers_for_url(&self, url: &str) -> LedgerResult<CacheValidators> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT etag, last_modified FROM acquisitions
                  WHERE url = ?1 AND (etag IS NOT NULL OR last_modified IS NOT NULL)
                  ORDER BY rowid DESC LIMIT 1",
                params![url],
                |row| {
                    Ok(CacheValidators {
                        etag: row.get(0)?,
                        last_modified: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(found.unwrap_or_default())
    }

    /// Earliest record holding these exact bytes
    pub fn find_by_content_hash(&self, hash: &ContentHash) -> LedgerResult<Option<LedgerRecord>> {
        if !self.content_hash_seen(hash) {
            return Ok(None);
        }
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM acquisitions WHERE content_hash = ?1 ORDER BY rowid LIMIT 1",
                    RECORD_COLUMNS
                ),
                params![hash.to_hex()],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Record whose perceptual hash is nearest to `hash`, if within `max_distance`
    pub fn find_perceptual_match(
        &self,
        hash: &PerceptualHash,
        max_distance: u32,
    ) -> LedgerResult<Option<LedgerRecord>> {
        let stored = match self.index().nearest_perceptual(hash, max_distance) {
            Some((stored, _)) => stored,
            None => return Ok(None),
        };
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM acquisitions WHERE phash = ?1 ORDER BY rowid LIMIT 1",
                    RECORD_COLUMNS
                ),
                params![stored.to_string()],
                RawRow::from_row,
            )
            .optional()?;
        raw.map(RawRow::into_record).transpose()
    }

    /// Aggregate counts over all records
    pub fn stats(&self) -> LedgerResult<LedgerStats> {
        let conn = self.conn()?;
        let (records, distinct_content, with_perceptual, with_validators, total_bytes) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT content_hash), COUNT(phash),
                        COALESCE(SUM(etag IS NOT NULL OR last_modified IS NOT NULL), 0),
                        COALESCE(SUM(size), 0)
                   FROM acquisitions",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )?;

        let mut stats = LedgerStats {
            records: records as usize,
            distinct_content: distinct_content as usize,
            with_perceptual: with_perceptual as usize,
            with_validators: with_validators as usize,
            total_bytes: total_bytes.max(0) as u64,
            ..Default::default()
        };

        let mut stmt = conn.prepare("SELECT tier, COUNT(*) FROM acquisitions GROUP BY tier")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (tier, count) = row?;
            stats.by_tier.insert(tier, count as usize);
        }
        let mut stmt = conn.prepare("SELECT source, COUNT(*) FROM acquisitions GROUP BY source")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (source, count) = row?;
            stats.by_source.insert(source, count as usize);
        }
        Ok(stats)
    }
}
