//! # fabrica-core
//!
//! The document graph and execution ledger of Fabrica.
//!
//! This crate keeps two stores side by side:
//! - the **Semantic Braid**: a directed, weighted, typed graph over documents
//! - the **Execution Ledger**: sealed records of every processing step,
//!   arranged in lineage trees
//!
//! Around them sit the **Chain Sync** (a hash-keyed log of ledger states),
//! **Scroll Anchors** (content-hash markers for documents) and the
//! **Cascade**, which drives documents through pluggable kernels and an
//! enrichment provider.
//!
//! ## Architectural Constraints
//!
//! - Synchronous and single-threaded; mutation requires `&mut self`
//! - No global state: every collaborator is passed in explicitly
//! - Failures are returned or reported, never raised as panics

// =============================================================================
// MODULES
// =============================================================================

pub mod anchor;
pub mod cascade;
pub mod chain;
pub mod clock;
pub mod enrichment;
pub mod formats;
pub mod graph;
pub mod kernel;
pub mod ledger;
pub mod primitives;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    DocumentId, ExecutionId, ExecutionStatus, FabricaError, LinkType, Metadata,
};

// =============================================================================
// RE-EXPORTS: Graph & Ledger
// =============================================================================

pub use graph::{BraidSnapshot, DocumentLink, DocumentNode, SemanticBraid};
pub use ledger::{ExecutionRecord, ExecutionRegistry, ExecutionRequest, ExecutionStats};

// =============================================================================
// RE-EXPORTS: Sync, Anchors, Collaborators
// =============================================================================

pub use anchor::{ScrollEntry, ScrollLinker, document_anchor};
pub use cascade::{Cascade, CascadeConfig, CascadeReport};
pub use chain::{ChainSync, SyncEntry, SyncOutcome};
pub use enrichment::{Enricher, Enrichment, UnavailableEnricher, parse_enrichment_response};
pub use kernel::{FileMetadataKernel, Kernel, KernelOutput, ProcessingContext};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{DocumentLock, LedgerDocument, SyncLogDocument, canonical_digest};
