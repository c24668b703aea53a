//! # Persistence Format
//!
//! JSON documents written by the core, and the file helpers that read and
//! write them.
//!
//! Documents:
//! - Ledger: `{ "version", "records": [...], "last_updated" }`
//! - Sync log: `{ "version", "created_at", "entries": [...] }`
//! - Codex chain: `{ "version", "entries": [...] }`
//!
//! ## Write Discipline
//!
//! Every write replaces the whole file: the document is rendered to a sibling
//! `.tmp` file which is then renamed over the target. Readers never observe a
//! half-written document.
//!
//! ## Locking
//!
//! Rename-on-write keeps single writes whole but does not stop two processes
//! from interleaving a read-modify-write cycle. `DocumentLock` holds an
//! exclusive advisory lock on a `{document}.lock` sidecar for the length of
//! such a cycle. The sidecar is used because the document itself is replaced
//! on every write.
//!
//! ## Size Limit
//!
//! Files larger than `MAX_DOCUMENT_SIZE` are rejected before they are read.

use crate::anchor::ScrollEntry;
use crate::chain::SyncEntry;
use crate::primitives::FORMAT_VERSION;
use crate::FabricaError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum accepted size of a persisted document (500 MB).
pub const MAX_DOCUMENT_SIZE: u64 = 500 * 1024 * 1024;

fn default_version() -> String {
    FORMAT_VERSION.to_string()
}

// =============================================================================
// DOCUMENT SHAPES
// =============================================================================

/// The persisted execution ledger.
///
/// Records are kept as raw JSON values so that one malformed record can be
/// skipped on load without discarding the rest of the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub records: Vec<Value>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// The external, append-only log of ledger states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub entries: Vec<SyncEntry>,
}

impl SyncLogDocument {
    /// An empty log stamped with its creation time.
    #[must_use]
    pub fn new(created_at: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            created_at: Some(created_at.into()),
            entries: Vec::new(),
        }
    }
}

/// The codex chain of document anchors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub entries: Vec<ScrollEntry>,
}

impl Default for CodexDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            entries: Vec::new(),
        }
    }
}

// =============================================================================
// FILE HELPERS
// =============================================================================

/// Read a file as text after checking its size.
fn read_bounded(path: &Path) -> Result<String, FabricaError> {
    let metadata = fs::metadata(path)
        .map_err(|e| FabricaError::IoError(format!("{}: {}", path.display(), e)))?;

    if metadata.len() > MAX_DOCUMENT_SIZE {
        return Err(FabricaError::DeserializationError(format!(
            "{} is {} bytes, maximum allowed is {} bytes",
            path.display(),
            metadata.len(),
            MAX_DOCUMENT_SIZE
        )));
    }

    fs::read_to_string(path).map_err(|e| FabricaError::IoError(format!("{}: {}", path.display(), e)))
}

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FabricaError> {
    let text = read_bounded(path)?;
    serde_json::from_str(&text).map_err(|e| {
        FabricaError::DeserializationError(format!("{}: {}", path.display(), e))
    })
}

/// Read a JSON document as an untyped value.
pub fn read_json_value(path: &Path) -> Result<Value, FabricaError> {
    read_json(path)
}

/// Serialize a document and atomically replace `path` with it.
///
/// Parent directories are created as needed.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), FabricaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| FabricaError::IoError(format!("{}: {}", parent.display(), e)))?;
    }

    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FabricaError::SerializationError(e.to_string()))?;

    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)
            .map_err(|e| FabricaError::IoError(format!("{}: {}", tmp.display(), e)))?;
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| FabricaError::IoError(format!("{}: {}", tmp.display(), e)))?;
    }

    fs::rename(&tmp, path).map_err(|e| {
        FabricaError::IoError(format!("{} -> {}: {}", tmp.display(), path.display(), e))
    })
}

// =============================================================================
// DOCUMENT LOCK
// =============================================================================

/// Cross-process lock guarding one persisted document.
pub struct DocumentLock {
    path: PathBuf,
    lock: RwLock<File>,
}

impl DocumentLock {
    /// Open (creating if needed) the sidecar lock file of `document`.
    pub fn open(document: &Path) -> Result<Self, FabricaError> {
        let path = Self::lock_path(document);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| FabricaError::IoError(format!("{}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| FabricaError::IoError(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// `{document}.lock`, next to the document.
    #[must_use]
    pub fn lock_path(document: &Path) -> PathBuf {
        let mut name = OsString::from(document.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the exclusive lock is held. Dropping the guard releases it.
    pub fn exclusive(&mut self) -> Result<RwLockWriteGuard<'_, File>, FabricaError> {
        let path = self.path.display().to_string();
        self.lock
            .write()
            .map_err(|e| FabricaError::IoError(format!("Failed to lock {}: {}", path, e)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
