//! # Scroll Anchors
//!
//! Content-hash markers for documents, appended to the codex chain file.
//!
//! An anchor reads `QS-SCROLL-{hash}-{unix seconds}` where `hash` is the
//! first `ANCHOR_HASH_LENGTH` hex characters of the SHA-256 of the document's
//! bytes. Verification compares only the hash segment, so a document stays
//! verified until its content changes.

use crate::clock;
use crate::formats::{CodexDocument, DocumentLock, read_json, sha256_hex, write_json_atomic};
use crate::primitives::{ANCHOR_HASH_LENGTH, ANCHOR_PREFIX};
use crate::{FabricaError, Metadata};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Truncated content hash of a document.
///
/// Uses `content` when given, otherwise the file's bytes. If the file cannot
/// be read the path itself is hashed.
#[must_use]
pub fn content_hash(path: &Path, content: Option<&[u8]>) -> String {
    let digest = match content {
        Some(bytes) => sha256_hex(bytes),
        None => match fs::read(path) {
            Ok(bytes) => sha256_hex(&bytes),
            Err(e) => {
                warn!("Failed to read {} for anchoring: {}", path.display(), e);
                sha256_hex(path.to_string_lossy().as_bytes())
            }
        },
    };
    digest.chars().take(ANCHOR_HASH_LENGTH).collect()
}

/// Build an anchor for a document at the current time.
#[must_use]
pub fn document_anchor(path: &Path, content: Option<&[u8]>) -> String {
    format!(
        "{}-{}-{}",
        ANCHOR_PREFIX,
        content_hash(path, content),
        clock::epoch_secs()
    )
}

/// The hash segment of an anchor, if it is well formed.
#[must_use]
pub fn anchor_hash(anchor: &str) -> Option<&str> {
    let rest = anchor.strip_prefix(ANCHOR_PREFIX)?.strip_prefix('-')?;
    let (hash, _timestamp) = rest.rsplit_once('-')?;
    Some(hash)
}

/// One document link in the codex chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollEntry {
    pub document: String,
    pub linked_at: String,
    pub linked_by: String,
    pub quantum_anchor: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Appends documents to, and verifies them against, a codex chain file.
#[derive(Debug, Clone)]
pub struct ScrollLinker {
    codex_path: PathBuf,
}

impl ScrollLinker {
    #[must_use]
    pub fn new(codex_path: impl Into<PathBuf>) -> Self {
        Self {
            codex_path: codex_path.into(),
        }
    }

    #[must_use]
    pub fn codex_path(&self) -> &Path {
        &self.codex_path
    }

    /// Read the chain; a missing or corrupt file gives an empty chain.
    fn load(&self) -> CodexDocument {
        if !self.codex_path.exists() {
            return CodexDocument::default();
        }
        read_json(&self.codex_path).unwrap_or_else(|e| {
            warn!(
                "Codex chain {} is unreadable, starting a fresh chain: {}",
                self.codex_path.display(),
                e
            );
            CodexDocument::default()
        })
    }

    /// Anchor a document and append it to the chain.
    pub fn link(
        &self,
        document: &Path,
        metadata: Metadata,
        operator: &str,
    ) -> Result<ScrollEntry, FabricaError> {
        let entry = ScrollEntry {
            document: document.display().to_string(),
            linked_at: clock::utc_timestamp(),
            linked_by: operator.to_string(),
            quantum_anchor: document_anchor(document, None),
            metadata,
        };

        let mut lock = DocumentLock::open(&self.codex_path)?;
        let _guard = lock.exclusive()?;

        let mut chain = self.load();
        chain.entries.push(entry.clone());
        write_json_atomic(&self.codex_path, &chain)?;

        info!("Document linked to scroll chain: {}", entry.quantum_anchor);
        Ok(entry)
    }

    /// Check a document's current content against its first chain entry.
    #[must_use]
    pub fn verify(&self, document: &Path) -> bool {
        let name = document.display().to_string();
        let Ok(chain) = read_json::<CodexDocument>(&self.codex_path) else {
            return false;
        };
        let Some(entry) = chain.entries.iter().find(|e| e.document == name) else {
            return false;
        };
        anchor_hash(&entry.quantum_anchor) == Some(content_hash(document, None).as_str())
    }

    /// Chain entries in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<ScrollEntry> {
        self.load().entries
    }
}
