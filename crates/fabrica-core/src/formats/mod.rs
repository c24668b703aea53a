//! # Formats
//!
//! On-disk JSON documents and the canonical hashing rules applied to them.
//!
//! - `persistence`: document shapes, atomic read/write helpers and the
//!   sidecar document lock
//! - `canonical`: key-sorted JSON and SHA-256 digests

pub mod canonical;
pub mod persistence;

pub use canonical::{canonical_digest, canonical_json, canonicalize, sha256_hex};
pub use persistence::{
    CodexDocument, DocumentLock, LedgerDocument, SyncLogDocument, read_json, read_json_value,
    write_json_atomic,
};
