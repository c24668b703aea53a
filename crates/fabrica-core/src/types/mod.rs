//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Fabrica core:
//! - Document identifiers and link types (`DocumentId`, `LinkType`)
//! - Execution identifiers and lifecycle states (`ExecutionId`, `ExecutionStatus`)
//! - Free-form JSON metadata (`Metadata`)
//! - Error types (`FabricaError`)
//!
//! ## Ordering Guarantees
//!
//! Every identifier implements `Ord` so the graph and the ledger can keep
//! their arenas in `BTreeMap`/`BTreeSet` and iterate deterministically.

use crate::primitives::{EXECUTION_ID_PREFIX, MAX_LINK_TYPE_LENGTH, SYMMETRIC_LINK_TYPES};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Free-form JSON object attached to documents, links and executions.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// DOCUMENT IDENTIFIERS
// =============================================================================

/// Stable identifier of a document node in the braid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identifier of a document from its path, title and type.
    ///
    /// SHA-256 over `"{path}:{title}:{type}"`, rendered as lowercase hex.
    #[must_use]
    pub fn derive(path: &str, title: &str, doc_type: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}:{}", path, title, doc_type).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// LINK TYPES
// =============================================================================

/// Label of a relationship between two documents.
///
/// The vocabulary is open: any trimmed, non-empty label without control
/// characters is accepted, and the braid registers new labels as they are
/// used. Only the symmetric labels carry special behavior.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LinkType(String);

impl LinkType {
    /// Validate and wrap a link label.
    pub fn new(label: impl AsRef<str>) -> Result<Self, FabricaError> {
        let label = label.as_ref().trim();
        if label.is_empty()
            || label.len() > MAX_LINK_TYPE_LENGTH
            || label.chars().any(char::is_control)
        {
            return Err(FabricaError::InvalidLinkType(label.to_string()));
        }
        Ok(Self(label.to_string()))
    }

    /// Whether creating this link also creates the reverse link.
    #[must_use]
    pub fn is_symmetric(&self) -> bool {
        SYMMETRIC_LINK_TYPES.contains(&self.0.as_str())
    }

    /// Get the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LinkType {
    type Error = FabricaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LinkType> for String {
    fn from(link_type: LinkType) -> Self {
        link_type.0
    }
}

// =============================================================================
// EXECUTION IDENTIFIERS
// =============================================================================

/// Unique identifier of a kernel execution.
///
/// Rendered as `ex-{millis:012x}-{counter:08x}`. Both segments are fixed-width
/// hex, so identifiers sort lexically in creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Wrap an existing identifier (e.g. one read back from disk).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an identifier from a millisecond timestamp and a counter value.
    #[must_use]
    pub fn generate(millis: u64, counter: u64) -> Self {
        Self(format!(
            "{}-{:012x}-{:08x}",
            EXECUTION_ID_PREFIX, millis, counter
        ))
    }

    /// Parse the trailing hex counter segment, if there is one.
    #[must_use]
    pub fn counter(&self) -> Option<u64> {
        let (_, tail) = self.0.rsplit_once('-')?;
        u64::from_str_radix(tail, 16).ok()
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// EXECUTION STATUS
// =============================================================================

/// Lifecycle state of an execution record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal states accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The persisted name of the status.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Fabrica core.
///
/// - Use `Result<T, FabricaError>` for fallible operations
/// - The core never panics; callers decide whether an error is fatal
/// - Integrity checks report `bool`, not errors
#[derive(Debug, Error)]
pub enum FabricaError {
    /// The referenced document is not in the braid.
    #[error("Document not found: {0}")]
    DocumentNotFound(DocumentId),

    /// The referenced execution is not in the registry.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// A link label failed validation.
    #[error("Invalid link type: {0:?}")]
    InvalidLinkType(String),

    /// The execution already reached a terminal state.
    #[error("Execution {id} is already {status}")]
    TerminalExecution {
        id: ExecutionId,
        status: ExecutionStatus,
    },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
