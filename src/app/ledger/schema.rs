//! Versioned schema migrations
//!
//! The applied version is tracked in `PRAGMA user_version`. Each step runs
//! once, inside its own transaction, when the ledger is opened.

use rusqlite::Connection;
use tracing::info;

use crate::errors::{LedgerError, LedgerResult};

/// Ordered migration steps; step `i` upgrades the schema to version `i + 1`
const MIGRATIONS: &[&str] = &[
    // 1: base table, unique only on (source, tier, key_hash)
    "CREATE TABLE IF NOT EXISTS acquisitions (
        source        TEXT NOT NULL,
        tier          TEXT NOT NULL,
        key_hash      TEXT NOT NULL,
        identity      TEXT NOT NULL,
        url           TEXT NOT NULL,
        content_hash  TEXT NOT NULL,
        path          TEXT NOT NULL,
        size          INTEGER NOT NULL,
        width         INTEGER NOT NULL,
        height        INTEGER NOT NULL,
        metadata      TEXT NOT NULL DEFAULT '{}',
        etag          TEXT,
        last_modified TEXT,
        created_at    TEXT NOT NULL,
        PRIMARY KEY (source, tier, key_hash)
    );
    CREATE INDEX IF NOT EXISTS idx_acquisitions_url ON acquisitions(url);",
    // 2: distinct URLs may share bytes, so content hashes get a plain index
    "DROP INDEX IF EXISTS uq_acquisitions_content_hash;
    CREATE INDEX IF NOT EXISTS idx_acquisitions_content_hash ON acquisitions(content_hash);",
    // 3: perceptual fingerprints
    "ALTER TABLE acquisitions ADD COLUMN phash TEXT;
    CREATE INDEX IF NOT EXISTS idx_acquisitions_phash ON acquisitions(phash)
        WHERE phash IS NOT NULL;",
];

/// Schema version after all migrations
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Version currently recorded in the database
pub fn current_version(conn: &Connection) -> LedgerResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Apply every migration newer than the recorded version
pub fn migrate(conn: &mut Connection) -> LedgerResult<i64> {
    let mut version = current_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(LedgerError::Migration {
            version,
            reason: format!(
                "database schema is newer than supported version {}",
                SCHEMA_VERSION
            ),
        });
    }

    for (step, sql) in MIGRATIONS.iter().enumerate().skip(version as usize) {
        let target = step as i64 + 1;
        let failed = |e: rusqlite::Error| LedgerError::Migration {
            version: target,
            reason: e.to_string(),
        };
        let tx = conn.transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", target)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;
        info!("Ledger schema migrated to version {}", target);
        version = target;
    }

    Ok(version)
}
