//! # Cascade
//!
//! Runs one document through the whole pipeline:
//!
//! 1. start a root execution
//! 2. run every kernel as a child execution
//! 3. ask the enricher for suggestions
//! 4. add the document to the braid and seed suggested links
//! 5. close the root execution
//! 6. sync the ledger and anchor the document, when configured
//!
//! All collaborators are injected; there is no global state. A cascade run
//! never panics and never returns an error: everything is reported in the
//! `CascadeReport`.

use crate::anchor::{ScrollEntry, ScrollLinker, document_anchor};
use crate::chain::{ChainSync, SyncOutcome};
use crate::clock;
use crate::enrichment::{Enricher, Enrichment, UnavailableEnricher, truncate_content};
use crate::graph::SemanticBraid;
use crate::kernel::{Kernel, KernelOutput, ProcessingContext};
use crate::ledger::{ExecutionRegistry, ExecutionRequest};
use crate::primitives::CASCADE_KERNEL;
use crate::{DocumentId, ExecutionId, LinkType, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Behaviour switches for a cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CascadeConfig {
    /// Ask the enricher for suggestions.
    pub enable_enrichment: bool,
    /// Sync the ledger after each document.
    pub enable_sync: bool,
    /// Link type of edges seeded from suggestions.
    pub suggestion_link_type: String,
    /// Suggestions below this confidence seed no edges.
    pub min_suggestion_confidence: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            enable_enrichment: true,
            enable_sync: true,
            suggestion_link_type: "references".to_string(),
            min_suggestion_confidence: 0.0,
        }
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeReport {
    pub success: bool,
    pub document: String,
    pub document_id: Option<DocumentId>,
    pub root_execution: ExecutionId,
    pub kernel_executions: Vec<ExecutionId>,
    pub kernel_outputs: Vec<KernelOutput>,
    pub enrichment: Option<Enrichment>,
    pub links_created: usize,
    pub sync: Option<SyncOutcome>,
    pub scroll: Option<ScrollEntry>,
    pub error: Option<String>,
}

// =============================================================================
// CASCADE
// =============================================================================

/// The document processing pipeline.
pub struct Cascade {
    braid: SemanticBraid,
    registry: ExecutionRegistry,
    kernels: Vec<Box<dyn Kernel>>,
    enricher: Box<dyn Enricher>,
    sync: Option<ChainSync>,
    linker: Option<ScrollLinker>,
    config: CascadeConfig,
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kernels: Vec<&str> = self.kernels.iter().map(|k| k.name()).collect();
        f.debug_struct("Cascade")
            .field("documents", &self.braid.node_count())
            .field("executions", &self.registry.len())
            .field("kernels", &kernels)
            .field("enricher_available", &self.enricher.is_available())
            .field("sync", &self.sync)
            .field("linker", &self.linker)
            .field("config", &self.config)
            .finish()
    }
}

impl Cascade {
    /// A cascade with no kernels, no enrichment provider and no sync.
    #[must_use]
    pub fn new(braid: SemanticBraid, registry: ExecutionRegistry, config: CascadeConfig) -> Self {
        Self {
            braid,
            registry,
            kernels: Vec::new(),
            enricher: Box::new(UnavailableEnricher::default()),
            sync: None,
            linker: None,
            config,
        }
    }

    /// Append a kernel. Kernels run in the order they were added.
    #[must_use]
    pub fn with_kernel(mut self, kernel: impl Kernel + 'static) -> Self {
        self.kernels.push(Box::new(kernel));
        self
    }

    #[must_use]
    pub fn with_enricher(mut self, enricher: impl Enricher + 'static) -> Self {
        self.enricher = Box::new(enricher);
        self
    }

    #[must_use]
    pub fn with_sync(mut self, sync: ChainSync) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Anchor every processed document in a codex chain.
    #[must_use]
    pub fn with_scroll_linker(mut self, linker: ScrollLinker) -> Self {
        self.linker = Some(linker);
        self
    }

    #[must_use]
    pub fn braid(&self) -> &SemanticBraid {
        &self.braid
    }

    pub fn braid_mut(&mut self) -> &mut SemanticBraid {
        &mut self.braid
    }

    #[must_use]
    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Registered kernels, in run order.
    pub fn kernels(&self) -> impl Iterator<Item = &dyn Kernel> {
        self.kernels.iter().map(|kernel| {
            let kernel: &dyn Kernel = kernel.as_ref();
            kernel
        })
    }

    /// Give back the braid and registry.
    #[must_use]
    pub fn into_parts(self) -> (SemanticBraid, ExecutionRegistry) {
        (self.braid, self.registry)
    }

    /// Process one document.
    pub fn process_document(&mut self, path: &Path, context: Option<Metadata>) -> CascadeReport {
        let doc_path = path.display().to_string();

        let mut context = ProcessingContext::from_metadata(context.unwrap_or_default());
        context.insert("cascade", json!(true));
        context.insert("processing_start", json!(clock::utc_timestamp()));
        context.insert("quantum_anchor", json!(document_anchor(path, None)));

        let root = self.registry.start_execution(
            ExecutionRequest::new(CASCADE_KERNEL, doc_path.as_str())
                .with_context(context.as_metadata().clone()),
        );
        let mut report = CascadeReport {
            success: false,
            document: doc_path.clone(),
            document_id: None,
            root_execution: root.clone(),
            kernel_executions: Vec::new(),
            kernel_outputs: Vec::new(),
            enrichment: None,
            links_created: 0,
            sync: None,
            scroll: None,
            error: None,
        };

        if let Err(e) = fs::metadata(path) {
            let message = format!("Document {} is not readable: {}", doc_path, e);
            warn!("{}", message);
            if let Err(e) = self.registry.fail_execution(&root, &message, None) {
                warn!("Could not close root execution {}: {}", root, e);
            }
            report.error = Some(message);
            report.sync = self.run_sync();
            return report;
        }

        // Kernels
        let mut failed_kernels = Vec::new();
        for kernel in &self.kernels {
            let child = self.registry.start_execution(
                ExecutionRequest::new(kernel.name(), doc_path.as_str()).with_parent(root.clone()),
            );
            let output = kernel.process(path, &mut context);

            let closed = if output.success {
                self.registry
                    .complete_execution(&child, output.to_value(), Some(output.stats.clone()))
            } else {
                failed_kernels.push(output.kernel.clone());
                let error = output.error.as_deref().unwrap_or("kernel reported failure");
                self.registry.fail_execution(&child, error, None)
            };
            if let Err(e) = closed {
                warn!("Could not close kernel execution {}: {}", child, e);
            }

            report.kernel_executions.push(child);
            report.kernel_outputs.push(output);
        }

        // Enrichment
        if self.config.enable_enrichment {
            let content = match fs::read_to_string(path) {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!("Enriching {} without content: {}", doc_path, e);
                    None
                }
            };
            let content = content.as_deref().map(truncate_content);
            report.enrichment = Some(self.enricher.enrich(path, content.as_deref()));
        }

        // Braid
        let metadata = document_metadata(&report.kernel_outputs, report.enrichment.as_ref(), &root);
        let document_id = self.braid.add_document(None, &doc_path, metadata).id().clone();
        report.links_created = self.seed_links(&document_id, report.enrichment.as_ref());
        report.document_id = Some(document_id.clone());

        // Root
        let root_output = json!({
            "document_id": document_id,
            "kernels": report.kernel_outputs.iter().map(|o| o.kernel.as_str()).collect::<Vec<_>>(),
            "failed_kernels": failed_kernels,
            "links_created": report.links_created,
            "processing": context.get("processing").cloned().unwrap_or(Value::Null),
        });
        let closed = if failed_kernels.is_empty() {
            self.registry.complete_execution(&root, root_output, None)
        } else {
            let message = format!("Kernel(s) failed: {}", failed_kernels.join(", "));
            report.error = Some(message.clone());
            self.registry.fail_execution(&root, message, None)
        };
        if let Err(e) = closed {
            warn!("Could not close root execution {}: {}", root, e);
            report.error.get_or_insert_with(|| e.to_string());
        }

        // Sync + anchor
        report.sync = self.run_sync();
        if let Some(linker) = &self.linker {
            let mut scroll_metadata = Metadata::new();
            scroll_metadata.insert("document_id".into(), json!(document_id));
            scroll_metadata.insert("root_execution".into(), json!(root));
            match linker.link(path, scroll_metadata, CASCADE_KERNEL) {
                Ok(entry) => report.scroll = Some(entry),
                Err(e) => warn!("Could not anchor {}: {}", doc_path, e),
            }
        }

        report.success = report.error.is_none();
        info!(
            "Cascade processed {} ({} kernels, {} links, success: {})",
            doc_path,
            report.kernel_outputs.len(),
            report.links_created,
            report.success
        );
        report
    }

    fn run_sync(&self) -> Option<SyncOutcome> {
        if !self.config.enable_sync {
            return None;
        }
        self.sync.as_ref().map(|sync| sync.sync(false))
    }

    /// Link a document to the suggestions it resolves. Returns links created.
    fn seed_links(&mut self, source: &DocumentId, enrichment: Option<&Enrichment>) -> usize {
        let Some(enrichment) = enrichment else {
            return 0;
        };
        if enrichment.is_stub() || enrichment.confidence < self.config.min_suggestion_confidence {
            return 0;
        }
        let link_type = match LinkType::new(&self.config.suggestion_link_type) {
            Ok(link_type) => link_type,
            Err(e) => {
                warn!("Suggested links skipped: {}", e);
                return 0;
            }
        };

        let mut created = 0usize;
        for suggestion in &enrichment.suggested_braid_links {
            let Some(target) = self.resolve(suggestion) else {
                debug!("Suggested link target {} is not in the braid", suggestion);
                continue;
            };
            if &target == source {
                continue;
            }

            let mut metadata = Metadata::new();
            metadata.insert("source".into(), json!("enrichment"));
            match self.braid.link(
                source,
                &target,
                link_type.clone(),
                enrichment.confidence,
                metadata,
            ) {
                Ok(_) => created = created.saturating_add(1),
                Err(e) => warn!("Could not seed suggested link: {}", e),
            }
        }
        created
    }

    /// Resolve a suggestion as a document id first, then as a path.
    fn resolve(&self, suggestion: &str) -> Option<DocumentId> {
        let id = DocumentId::new(suggestion);
        if self.braid.contains(&id) {
            return Some(id);
        }
        self.braid.find_by_path(suggestion).map(|node| node.id().clone())
    }
}

/// Metadata for the braid node of a processed document.
fn document_metadata(
    outputs: &[KernelOutput],
    enrichment: Option<&Enrichment>,
    root: &ExecutionId,
) -> Metadata {
    let mut metadata = Metadata::new();

    let successful = outputs.iter().filter(|o| o.success);
    let mut tags: BTreeSet<String> = successful
        .clone()
        .flat_map(|o| o.tags())
        .map(str::to_lowercase)
        .collect();

    if let Some(title) = successful
        .clone()
        .find_map(|o| o.metadata.get("title").and_then(Value::as_str))
    {
        metadata.insert("title".into(), json!(title));
    }

    if let Some(enrichment) = enrichment {
        metadata.insert("type".into(), json!(enrichment.doc_type));
        metadata.insert("summary".into(), json!(enrichment.summary));
        metadata.insert("domains".into(), json!(enrichment.domains));
        tags.extend(enrichment.tags.iter().map(|t| t.to_lowercase()));
    }

    metadata.insert("tags".into(), json!(tags));
    metadata.insert(
        "kernels".into(),
        json!(successful.map(|o| o.kernel.as_str()).collect::<Vec<_>>()),
    );
    metadata.insert("root_execution".into(), json!(root));
    metadata
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecutionStatus;
    use crate::kernel::FileMetadataKernel;

    struct TagKernel;

    impl Kernel for TagKernel {
        fn name(&self) -> &str {
            "tagger"
        }

        fn process(&self, _path: &Path, context: &mut ProcessingContext) -> KernelOutput {
            let mut metadata = Metadata::new();
            metadata.insert("tags".into(), json!(["Draft"]));
            metadata.insert("title".into(), json!("Tagged Title"));
            context.record("tagger", json!({"seen": true}));
            KernelOutput::succeeded("tagger", metadata, Metadata::new())
        }
    }

    struct BrokenKernel;

    impl Kernel for BrokenKernel {
        fn name(&self) -> &str {
            "broken"
        }

        fn process(&self, _path: &Path, _context: &mut ProcessingContext) -> KernelOutput {
            KernelOutput::failed("broken", "parser exploded")
        }
    }

    struct FixedEnricher(Enrichment);

    impl Enricher for FixedEnricher {
        fn is_available(&self) -> bool {
            true
        }

        fn enrich(&self, _path: &Path, _content: Option<&str>) -> Enrichment {
            self.0.clone()
        }
    }

    fn suggestion(targets: &[&str], confidence: f64) -> Enrichment {
        Enrichment {
            doc_type: "note".to_string(),
            domains: vec!["math".to_string()],
            summary: "short".to_string(),
            tags: vec!["Algebra".to_string()],
            suggested_braid_links: targets.iter().map(|t| t.to_string()).collect(),
            confidence,
            provenance: Default::default(),
        }
    }

    fn write_doc(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write doc");
        path
    }

    #[test]
    fn one_root_and_one_child_per_kernel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "a.md", "hello world");
        let mut cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::in_memory(), CascadeConfig::default())
            .with_kernel(FileMetadataKernel)
            .with_kernel(TagKernel);

        let report = cascade.process_document(&doc, None);

        assert!(report.success, "{:?}", report.error);
        assert_eq!(report.kernel_executions.len(), 2);
        let trace = cascade.registry().get_trace(&report.root_execution);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0].kernel_name, CASCADE_KERNEL);
        assert!(trace.iter().all(|r| r.status == ExecutionStatus::Completed));
        assert!(cascade.registry().verify_seal(&report.root_execution));
    }

    #[test]
    fn kernels_are_listed_in_run_order() {
        let cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::in_memory(), CascadeConfig::default())
            .with_kernel(FileMetadataKernel)
            .with_kernel(TagKernel);

        let names: Vec<&str> = cascade.kernels().map(|k| k.name()).collect();
        assert_eq!(names, vec![FileMetadataKernel::NAME, "tagger"]);
        assert_eq!(cascade.kernels().nth(1).map(|k| k.description()), Some("No description"));
    }

    #[test]
    fn document_node_collects_tags_and_enrichment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "a.md", "body");
        let mut cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::in_memory(), CascadeConfig::default())
            .with_kernel(TagKernel)
            .with_enricher(FixedEnricher(suggestion(&[], 0.5)));

        let report = cascade.process_document(&doc, None);
        let id = report.document_id.expect("document id");
        let node = cascade.braid().get_document(&id).expect("node");

        assert_eq!(node.title(), "Tagged Title");
        assert_eq!(node.doc_type(), "note");
        assert!(node.has_tag("draft"));
        assert!(node.has_tag("algebra"));
        assert_eq!(node.metadata()["summary"], json!("short"));
    }

    #[test]
    fn suggestions_seed_links_by_path_and_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "new.md", "body");
        let mut braid = SemanticBraid::new();
        braid.add_document(Some(DocumentId::new("known")), "old.md", Metadata::new());
        braid.add_document(None, "by/path.md", Metadata::new());

        let mut cascade = Cascade::new(braid, ExecutionRegistry::in_memory(), CascadeConfig::default())
            .with_enricher(FixedEnricher(suggestion(&["known", "by/path.md", "ghost"], 0.7)));

        let report = cascade.process_document(&doc, None);
        assert_eq!(report.links_created, 2);

        let id = report.document_id.expect("document id");
        let related = cascade.braid().find_related(&id, None, 0.0).expect("related");
        assert_eq!(related.len(), 2);
        assert!(related.iter().all(|(_, w)| (*w - 0.7).abs() < f64::EPSILON));
    }

    #[test]
    fn low_confidence_suggestions_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "new.md", "body");
        let mut braid = SemanticBraid::new();
        braid.add_document(Some(DocumentId::new("known")), "old.md", Metadata::new());
        let config = CascadeConfig {
            min_suggestion_confidence: 0.8,
            ..CascadeConfig::default()
        };

        let mut cascade = Cascade::new(braid, ExecutionRegistry::in_memory(), config)
            .with_enricher(FixedEnricher(suggestion(&["known"], 0.5)));

        assert_eq!(cascade.process_document(&doc, None).links_created, 0);
    }

    #[test]
    fn failing_kernel_fails_root_but_keeps_going() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "a.md", "body");
        let mut cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::in_memory(), CascadeConfig::default())
            .with_kernel(BrokenKernel)
            .with_kernel(TagKernel);

        let report = cascade.process_document(&doc, None);

        assert!(!report.success);
        assert_eq!(report.kernel_outputs.len(), 2);
        assert!(report.document_id.is_some());
        let root = cascade.registry().get_execution(&report.root_execution).expect("root");
        assert_eq!(root.status, ExecutionStatus::Failed);
        assert!(root.error.as_deref().is_some_and(|e| e.contains("broken")));
    }

    #[test]
    fn missing_document_is_reported() {
        let mut cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::in_memory(), CascadeConfig::default())
            .with_kernel(FileMetadataKernel);

        let report = cascade.process_document(Path::new("/no/such/doc.md"), None);

        assert!(!report.success);
        assert!(report.document_id.is_none());
        assert!(report.kernel_executions.is_empty());
        assert_eq!(cascade.braid().node_count(), 0);
        assert_eq!(
            cascade.registry().get_execution(&report.root_execution).map(|r| r.status),
            Some(ExecutionStatus::Failed)
        );
    }

    #[test]
    fn sync_and_anchor_run_when_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "a.md", "body");
        let ledger = dir.path().join("ledger.json");
        let mut cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::open(&ledger), CascadeConfig::default())
            .with_kernel(FileMetadataKernel)
            .with_sync(ChainSync::new(&ledger, dir.path().join("sync.json")))
            .with_scroll_linker(ScrollLinker::new(dir.path().join("codex.json")));

        let report = cascade.process_document(&doc, None);

        let sync = report.sync.expect("sync outcome");
        assert!(sync.success, "{}", sync.message);
        assert!(report.scroll.is_some());
        assert!(ScrollLinker::new(dir.path().join("codex.json")).verify(&doc));
    }

    #[test]
    fn disabled_enrichment_and_sync_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = write_doc(dir.path(), "a.md", "body");
        let config = CascadeConfig {
            enable_enrichment: false,
            enable_sync: false,
            ..CascadeConfig::default()
        };
        let mut cascade = Cascade::new(SemanticBraid::new(), ExecutionRegistry::in_memory(), config)
            .with_sync(ChainSync::new(dir.path().join("l.json"), dir.path().join("s.json")));

        let report = cascade.process_document(&doc, None);
        assert!(report.enrichment.is_none());
        assert!(report.sync.is_none());
        assert!(report.success);
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let parsed: Result<CascadeConfig, _> = serde_json::from_value(json!({"enable_sync": false}));
        assert!(parsed.is_ok_and(|c| !c.enable_sync && c.enable_enrichment));

        let unknown: Result<CascadeConfig, _> = serde_json::from_value(json!({"surprise": 1}));
        assert!(unknown.is_err());
    }
}
