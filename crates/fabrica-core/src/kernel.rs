//! # Kernels
//!
//! Pluggable extractors run by the cascade against a document.
//!
//! A kernel reads the document, reports what it found in a `KernelOutput`,
//! and on success records its findings in the shared `ProcessingContext`
//! under `processing.{kernel name}` so later kernels can read them. The core
//! treats the context as opaque pass-through state.
//!
//! # Extension Point
//!
//! Genre-specific kernels live outside the core. `FileMetadataKernel` is the
//! only built-in one.

use crate::Metadata;
use serde::Serialize;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;

// =============================================================================
// PROCESSING CONTEXT
// =============================================================================

/// Mutable state shared by the kernels of one cascade run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingContext {
    values: Metadata,
}

impl ProcessingContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap caller-supplied context.
    #[must_use]
    pub fn from_metadata(values: Metadata) -> Self {
        Self { values }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store a kernel's findings under `processing.{kernel}`.
    ///
    /// A `processing` entry that is not an object is replaced.
    pub fn record(&mut self, kernel: &str, findings: Value) {
        let processing = self
            .values
            .entry("processing")
            .or_insert_with(|| Value::Object(Metadata::new()));
        if !processing.is_object() {
            *processing = Value::Object(Metadata::new());
        }
        if let Value::Object(map) = processing {
            map.insert(kernel.to_string(), findings);
        }
    }

    /// Findings recorded by a kernel.
    #[must_use]
    pub fn processing(&self, kernel: &str) -> Option<&Value> {
        self.values.get("processing")?.get(kernel)
    }

    #[must_use]
    pub fn as_metadata(&self) -> &Metadata {
        &self.values
    }
}

// =============================================================================
// KERNEL OUTPUT
// =============================================================================

/// What a kernel reports back for one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelOutput {
    pub success: bool,
    pub kernel: String,
    pub metadata: Metadata,
    pub stats: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KernelOutput {
    #[must_use]
    pub fn succeeded(kernel: impl Into<String>, metadata: Metadata, stats: Metadata) -> Self {
        Self {
            success: true,
            kernel: kernel.into(),
            metadata,
            stats,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(kernel: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            kernel: kernel.into(),
            metadata: Metadata::new(),
            stats: Metadata::new(),
            error: Some(error.into()),
        }
    }

    /// Tags listed under `metadata.tags`.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        match self.metadata.get("tags") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(tag)) => vec![tag.as_str()],
            _ => Vec::new(),
        }
    }

    /// The output as the JSON payload stored in the ledger.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "success": self.success,
            "kernel": self.kernel,
            "metadata": self.metadata,
            "stats": self.stats,
            "error": self.error,
        })
    }
}

// =============================================================================
// KERNEL TRAIT
// =============================================================================

/// A document extractor.
///
/// Kernels must be `Send + Sync` so a cascade can be shared behind a lock.
pub trait Kernel: Send + Sync {
    /// Stable name, used as the ledger kernel name and the context key.
    fn name(&self) -> &str;

    /// One-line summary shown when listing kernels.
    fn description(&self) -> &str {
        "No description"
    }

    /// Process one document. Failures are reported in the output, not raised.
    fn process(&self, path: &Path, context: &mut ProcessingContext) -> KernelOutput;
}

// =============================================================================
// FILE METADATA KERNEL
// =============================================================================

/// Reports file name, extension, size and line/word counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileMetadataKernel;

impl FileMetadataKernel {
    pub const NAME: &'static str = "file_metadata";
}

impl Kernel for FileMetadataKernel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "File name, extension, size and line/word/char counts"
    }

    fn process(&self, path: &Path, context: &mut ProcessingContext) -> KernelOutput {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return KernelOutput::failed(
                    Self::NAME,
                    format!("Failed to load document {}: {}", path.display(), e),
                );
            }
        };
        let text = String::from_utf8_lossy(&bytes);

        let mut metadata = Metadata::new();
        metadata.insert("path".into(), json!(path.display().to_string()));
        metadata.insert(
            "filename".into(),
            json!(path.file_name().map(|n| n.to_string_lossy().into_owned())),
        );
        metadata.insert(
            "extension".into(),
            json!(path.extension().map(|e| e.to_string_lossy().to_lowercase())),
        );
        metadata.insert("file_size".into(), json!(bytes.len()));
        metadata.insert("kernel".into(), json!(Self::NAME));

        let mut stats = Metadata::new();
        stats.insert("line_count".into(), json!(text.lines().count()));
        stats.insert("word_count".into(), json!(text.split_whitespace().count()));
        stats.insert("char_count".into(), json!(text.chars().count()));

        context.record(
            Self::NAME,
            json!({ "metadata": metadata, "stats": stats }),
        );
        KernelOutput::succeeded(Self::NAME, metadata, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_nests_under_processing() {
        let mut context = ProcessingContext::new();
        context.record("a", json!({"n": 1}));
        context.record("b", json!({"n": 2}));

        assert_eq!(context.processing("a"), Some(&json!({"n": 1})));
        assert_eq!(context.processing("b"), Some(&json!({"n": 2})));
        assert!(context.processing("c").is_none());
    }

    #[test]
    fn record_replaces_non_object_processing() {
        let mut context = ProcessingContext::new();
        context.insert("processing", json!("junk"));
        context.record("a", json!(true));
        assert_eq!(context.processing("a"), Some(&json!(true)));
    }

    #[test]
    fn output_tags_accept_list_or_string() {
        let mut metadata = Metadata::new();
        metadata.insert("tags".into(), json!(["x", 1, "y"]));
        let out = KernelOutput::succeeded("k", metadata, Metadata::new());
        assert_eq!(out.tags(), vec!["x", "y"]);

        let mut single = Metadata::new();
        single.insert("tags".into(), json!("solo"));
        assert_eq!(KernelOutput::succeeded("k", single, Metadata::new()).tags(), vec!["solo"]);
    }

    #[test]
    fn file_metadata_reports_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Note.MD");
        fs::write(&path, "one two\nthree\n").expect("write");

        let mut context = ProcessingContext::new();
        let out = FileMetadataKernel.process(&path, &mut context);

        assert!(out.success);
        assert_eq!(out.metadata["extension"], json!("md"));
        assert_eq!(out.metadata["filename"], json!("Note.MD"));
        assert_eq!(out.metadata["file_size"], json!(14));
        assert_eq!(out.stats["line_count"], json!(2));
        assert_eq!(out.stats["word_count"], json!(3));
        assert!(context.processing(FileMetadataKernel::NAME).is_some());
    }

    #[test]
    fn kernels_describe_themselves() {
        struct Bare;
        impl Kernel for Bare {
            fn name(&self) -> &str {
                "bare"
            }
            fn process(&self, _: &Path, _: &mut ProcessingContext) -> KernelOutput {
                KernelOutput::failed("bare", "unused")
            }
        }

        assert_eq!(Bare.description(), "No description");
        assert!(FileMetadataKernel.description().contains("size"));
    }

    #[test]
    fn file_metadata_missing_file_fails_without_context() {
        let mut context = ProcessingContext::new();
        let out = FileMetadataKernel.process(Path::new("/no/such/file.txt"), &mut context);

        assert!(!out.success);
        assert!(out.error.is_some());
        assert!(context.processing(FileMetadataKernel::NAME).is_none());
    }
}
