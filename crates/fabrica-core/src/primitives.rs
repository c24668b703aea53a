//! # Fixed Primitives
//!
//! Hardcoded runtime constants for the Fabrica core.
//!
//! These values are compiled into the binary and shared by the graph, the
//! ledger and the on-disk formats.

/// Link types that automatically synthesize a reverse link on creation.
///
/// Every other link type is directional only.
pub const SYMMETRIC_LINK_TYPES: &[&str] = &["similar_to", "related_to"];

/// Maximum length of a link type label, in bytes.
pub const MAX_LINK_TYPE_LENGTH: usize = 128;

/// Document type assumed when metadata does not name one.
pub const DEFAULT_DOCUMENT_TYPE: &str = "document";

/// Default hop budget for shortest-path queries.
pub const DEFAULT_MAX_HOPS: usize = 5;

/// Prefix of every generated execution identifier.
pub const EXECUTION_ID_PREFIX: &str = "ex";

/// Format version written into the ledger, sync log, codex chain and braid files.
pub const FORMAT_VERSION: &str = "1.0";

/// Prefix of document anchors written to the codex chain.
pub const ANCHOR_PREFIX: &str = "QS-SCROLL";

/// Number of hex characters of the content hash kept in an anchor.
pub const ANCHOR_HASH_LENGTH: usize = 16;

/// Maximum number of characters handed to an enrichment provider.
pub const MAX_ENRICHMENT_CONTENT: usize = 32_000;

/// Kernel name recorded for the root execution of a cascade run.
pub const CASCADE_KERNEL: &str = "cascade";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symmetric_types_are_fixed() {
        assert_eq!(SYMMETRIC_LINK_TYPES, &["similar_to", "related_to"]);
    }

    #[test]
    fn anchor_hash_fits_digest() {
        assert!(ANCHOR_HASH_LENGTH <= 64);
    }
}
