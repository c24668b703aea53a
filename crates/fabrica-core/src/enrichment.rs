//! # Enrichment
//!
//! Structured suggestions about a document from an external provider: type,
//! domains, summary, tags and documents it likely references.
//!
//! The core makes no assumption that a provider is reachable. Anything that
//! goes wrong turns into the low-confidence stub from
//! `Enrichment::unavailable`.

use crate::clock;
use crate::primitives::{DEFAULT_DOCUMENT_TYPE, MAX_ENRICHMENT_CONTENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

/// Tag attached to stub enrichments.
pub const ENRICHMENT_FAILED_TAG: &str = "enrichment_failed";

const TRUNCATION_MARKER: &str = "\n[Document truncated for processing]";

fn default_type() -> String {
    DEFAULT_DOCUMENT_TYPE.to_string()
}

/// Where an enrichment came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Suggestions for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(rename = "type", default = "default_type")]
    pub doc_type: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Document ids or paths this document likely references.
    #[serde(default)]
    pub suggested_braid_links: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(rename = "_enrichment", default)]
    pub provenance: Provenance,
}

impl Enrichment {
    /// The stub returned when no usable enrichment is available.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            doc_type: default_type(),
            domains: Vec::new(),
            summary: String::new(),
            tags: vec![ENRICHMENT_FAILED_TAG.to_string()],
            suggested_braid_links: Vec::new(),
            confidence: 0.0,
            provenance: Provenance {
                model: None,
                error: Some(reason.into()),
                timestamp: Some(clock::utc_timestamp()),
            },
        }
    }

    /// Whether this is the stub rather than a provider answer.
    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.provenance.error.is_some()
    }
}

/// Turn a provider's raw answer into an `Enrichment`.
///
/// Surrounding Markdown code fences are ignored. Missing keys take their
/// defaults and confidence is clamped into `[0.0, 1.0]`. Anything that is
/// not a JSON object with the expected shape gives the stub.
#[must_use]
pub fn parse_enrichment_response(raw: &str, model: &str) -> Enrichment {
    let body = strip_code_fence(raw);

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!("Failed to parse enrichment response: {}", e);
            debug!("Enrichment response: {}", raw);
            return Enrichment::unavailable("Failed to parse enrichment response");
        }
    };
    if !value.is_object() {
        return Enrichment::unavailable("Expected a JSON object");
    }

    match serde_json::from_value::<Enrichment>(value) {
        Ok(mut enrichment) => {
            enrichment.confidence = if enrichment.confidence.is_nan() {
                0.0
            } else {
                enrichment.confidence.clamp(0.0, 1.0)
            };
            enrichment.provenance = Provenance {
                model: Some(model.to_string()),
                error: None,
                timestamp: Some(clock::utc_timestamp()),
            };
            enrichment
        }
        Err(e) => {
            warn!("Enrichment response has an unexpected shape: {}", e);
            Enrichment::unavailable(format!("Unexpected enrichment shape: {}", e))
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map_or("", |(_lang, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Cap content at `MAX_ENRICHMENT_CONTENT` characters, marking the cut.
#[must_use]
pub fn truncate_content(content: &str) -> Cow<'_, str> {
    match content.char_indices().nth(MAX_ENRICHMENT_CONTENT) {
        Some((cut, _)) => Cow::Owned(format!("{}{}", &content[..cut], TRUNCATION_MARKER)),
        None => Cow::Borrowed(content),
    }
}

// =============================================================================
// ENRICHER TRAIT
// =============================================================================

/// An enrichment provider.
pub trait Enricher: Send + Sync {
    fn is_available(&self) -> bool;

    /// Enrich a document. `content` is the already-loaded text, if any.
    fn enrich(&self, path: &Path, content: Option<&str>) -> Enrichment;
}

/// A provider that is never available.
#[derive(Debug, Clone)]
pub struct UnavailableEnricher {
    reason: String,
}

impl UnavailableEnricher {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for UnavailableEnricher {
    fn default() -> Self {
        Self::new("No enrichment provider configured")
    }
}

impl Enricher for UnavailableEnricher {
    fn is_available(&self) -> bool {
        false
    }

    fn enrich(&self, _path: &Path, _content: Option<&str>) -> Enrichment {
        Enrichment::unavailable(self.reason.clone())
    }
}
