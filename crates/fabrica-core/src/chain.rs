//! # Chain Sync
//!
//! Hash-links the persisted ledger into an external, append-only sync log.
//!
//! The ledger file is hashed over its canonical JSON (keys sorted
//! recursively), so reformatting the file does not change its hash. A sync
//! appends `(hash, timestamp, ledger path)` unless that hash is already
//! logged. Sync never fails the caller: every problem is reported through
//! `SyncOutcome`.

use crate::clock;
use crate::formats::{
    DocumentLock, SyncLogDocument, canonical_digest, read_json, read_json_value, write_json_atomic,
};
use crate::FabricaError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// One logged ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub registry_hash: String,
    pub timestamp: String,
    pub registry_path: String,
}

/// Result of a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    /// The matching or newly appended entry.
    pub entry: Option<SyncEntry>,
}

impl SyncOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            entry: None,
        }
    }
}

/// Syncs one ledger file into one sync log.
#[derive(Debug, Clone)]
pub struct ChainSync {
    ledger_path: PathBuf,
    log_path: PathBuf,
}

impl ChainSync {
    /// Create a syncer. The ledger path is made absolute so log entries
    /// identify the ledger regardless of the working directory.
    #[must_use]
    pub fn new(ledger_path: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        let ledger_path = ledger_path.into();
        let ledger_path = std::path::absolute(&ledger_path).unwrap_or(ledger_path);
        Self {
            ledger_path,
            log_path: log_path.into(),
        }
    }

    #[must_use]
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// SHA-256 of the ledger file's canonical JSON.
    pub fn ledger_hash(&self) -> Result<String, FabricaError> {
        let value = read_json_value(&self.ledger_path)?;
        canonical_digest(&value)
    }

    /// Read the sync log, or start a fresh one if it is missing or unreadable.
    fn load_log(&self) -> SyncLogDocument {
        if !self.log_path.exists() {
            return SyncLogDocument::new(clock::utc_timestamp());
        }
        match read_json::<SyncLogDocument>(&self.log_path) {
            Ok(log) => log,
            Err(e) => {
                warn!(
                    "Sync log {} is unreadable, starting a fresh log: {}",
                    self.log_path.display(),
                    e
                );
                SyncLogDocument::new(clock::utc_timestamp())
            }
        }
    }

    /// Record the current ledger state in the sync log.
    ///
    /// Without `force`, a hash that is already logged is reported as
    /// synchronized and nothing is appended.
    #[must_use]
    pub fn sync(&self, force: bool) -> SyncOutcome {
        match self.try_sync(force) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Chain sync failed: {}", e);
                SyncOutcome::failed(format!("Sync failed: {}", e))
            }
        }
    }

    fn try_sync(&self, force: bool) -> Result<SyncOutcome, FabricaError> {
        let mut lock = DocumentLock::open(&self.log_path)?;
        let _guard = lock.exclusive()?;

        let hash = self.ledger_hash()?;
        let mut log = self.load_log();

        if !force
            && let Some(existing) = log.entries.iter().find(|e| e.registry_hash == hash)
        {
            return Ok(SyncOutcome {
                success: true,
                message: format!("Registry already synchronized at {}", existing.timestamp),
                entry: Some(existing.clone()),
            });
        }

        let entry = SyncEntry {
            registry_hash: hash,
            timestamp: clock::utc_timestamp(),
            registry_path: self.ledger_path.display().to_string(),
        };
        log.entries.push(entry.clone());
        write_json_atomic(&self.log_path, &log)?;

        let written: SyncLogDocument = read_json(&self.log_path)?;
        if !written
            .entries
            .iter()
            .any(|e| e.registry_hash == entry.registry_hash)
        {
            return Ok(SyncOutcome::failed(
                "Sync verification failed: entry missing after write",
            ));
        }

        info!("Registry synchronized: {}", entry.registry_hash);
        Ok(SyncOutcome {
            success: true,
            message: format!("Registry synchronized at {}", entry.timestamp),
            entry: Some(entry),
        })
    }

    /// Whether the ledger's current hash appears in the sync log.
    #[must_use]
    pub fn verify(&self) -> bool {
        let Ok(hash) = self.ledger_hash() else {
            return false;
        };
        match read_json::<SyncLogDocument>(&self.log_path) {
            Ok(log) => log.entries.iter().any(|e| e.registry_hash == hash),
            Err(_) => false,
        }
    }

    /// All logged entries in append order. Missing or unreadable logs are empty.
    #[must_use]
    pub fn entries(&self) -> Vec<SyncEntry> {
        if !self.log_path.exists() {
            return Vec::new();
        }
        match read_json::<SyncLogDocument>(&self.log_path) {
            Ok(log) => log.entries,
            Err(e) => {
                warn!("Cannot read sync log {}: {}", self.log_path.display(), e);
                Vec::new()
            }
        }
    }

    /// The entry with the greatest timestamp; the earliest logged wins ties.
    #[must_use]
    pub fn get_latest(&self) -> Option<SyncEntry> {
        self.entries()
            .into_iter()
            .reduce(|best, entry| if entry.timestamp > best.timestamp { entry } else { best })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup(ledger: &str) -> (tempfile::TempDir, ChainSync) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger_path = dir.path().join("ledger.json");
        fs::write(&ledger_path, ledger).expect("write ledger");
        let sync = ChainSync::new(&ledger_path, dir.path().join("sync").join("log.json"));
        (dir, sync)
    }

    #[test]
    fn repeated_sync_appends_once() {
        let (_dir, sync) = setup(r#"{"version": "1.0", "records": []}"#);

        let first = sync.sync(false);
        let second = sync.sync(false);

        assert!(first.success);
        assert!(second.success);
        assert!(second.message.contains("already synchronized"));
        assert_eq!(first.entry, second.entry);
        assert_eq!(sync.entries().len(), 1);
    }

    #[test]
    fn forced_sync_appends_again() {
        let (_dir, sync) = setup(r#"{"records": []}"#);
        assert!(sync.sync(false).success);
        assert!(sync.sync(true).success);
        assert_eq!(sync.entries().len(), 2);
    }

    #[test]
    fn hash_ignores_key_order_and_whitespace() {
        let (_a, first) = setup(r#"{"a": 1, "b": {"y": 2, "x": 3}}"#);
        let (_b, second) = setup("{\"b\":{\"x\":3,\"y\":2},\n \"a\":1}");

        assert_eq!(
            first.ledger_hash().expect("hash"),
            second.ledger_hash().expect("hash")
        );
    }

    #[test]
    fn verify_tracks_ledger_changes() {
        let (_dir, sync) = setup(r#"{"records": []}"#);
        assert!(!sync.verify());

        assert!(sync.sync(false).success);
        assert!(sync.verify());

        fs::write(sync.ledger_path(), r#"{"records": [1]}"#).expect("rewrite");
        assert!(!sync.verify());
    }

    #[test]
    fn missing_ledger_reports_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sync = ChainSync::new(dir.path().join("absent.json"), dir.path().join("log.json"));

        let outcome = sync.sync(false);
        assert!(!outcome.success);
        assert!(outcome.entry.is_none());
        assert!(!dir.path().join("log.json").exists());
    }

    #[test]
    fn corrupt_log_is_replaced() {
        let (_dir, sync) = setup(r#"{"records": []}"#);
        fs::create_dir_all(sync.log_path().parent().expect("parent")).expect("mkdir");
        fs::write(sync.log_path(), "garbage").expect("write");

        assert!(sync.entries().is_empty());
        assert!(sync.sync(false).success);
        assert_eq!(sync.entries().len(), 1);
    }

    #[test]
    fn entries_record_absolute_ledger_path() {
        let (_dir, sync) = setup("{}");
        let outcome = sync.sync(false);
        let entry = outcome.entry.expect("entry");

        assert!(Path::new(&entry.registry_path).is_absolute());
        assert_eq!(entry.registry_hash.len(), 64);
    }

    #[test]
    fn latest_prefers_greatest_timestamp() {
        let (_dir, sync) = setup("{}");
        let entry = |hash: &str, ts: &str| SyncEntry {
            registry_hash: hash.to_string(),
            timestamp: ts.to_string(),
            registry_path: "/l".to_string(),
        };
        let mut log = SyncLogDocument::new("2026-01-01T00:00:00.000000Z");
        log.entries = vec![
            entry("a", "2026-01-02T00:00:00.000000Z"),
            entry("b", "2026-01-03T00:00:00.000000Z"),
            entry("c", "2026-01-03T00:00:00.000000Z"),
            entry("d", "2026-01-01T00:00:00.000000Z"),
        ];
        write_json_atomic(sync.log_path(), &log).expect("write");

        assert_eq!(sync.get_latest().map(|e| e.registry_hash), Some("b".to_string()));
    }

    #[test]
    fn latest_of_empty_log_is_none() {
        let (_dir, sync) = setup("{}");
        assert!(sync.get_latest().is_none());
    }
}
