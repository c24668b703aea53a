//! # Execution Ledger
//!
//! Records every kernel execution with its inputs, outputs and lineage.
//!
//! Records live in a `BTreeMap` arena keyed by `ExecutionId`; parent/child
//! relationships are id references. When the registry has a backing file,
//! every mutation rewrites it in full while holding the ledger's sidecar
//! lock, after merging whatever other processes wrote in the meantime.
//!
//! ## Lifecycle
//!
//! `start_execution` creates a RUNNING record. From there a record moves to
//! exactly one of COMPLETED, FAILED or CANCELLED and never leaves it again.
//! Completing a record seals it.

mod record;
mod stats;

pub use record::{ExecutionRecord, ExecutionRequest};
pub use stats::ExecutionStats;

use crate::clock;
use crate::formats::{DocumentLock, LedgerDocument, read_json, write_json_atomic};
use crate::primitives::FORMAT_VERSION;
use crate::{ExecutionId, ExecutionStatus, FabricaError, Metadata};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// The execution registry.
#[derive(Debug, Clone)]
pub struct ExecutionRegistry {
    /// Record arena: ExecutionId -> ExecutionRecord
    records: BTreeMap<ExecutionId, ExecutionRecord>,

    /// Backing file, if any.
    storage_path: Option<PathBuf>,

    /// Counter for the next generated id.
    next_counter: u64,
}

impl Default for ExecutionRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ExecutionRegistry {
    /// Create a registry without a backing file.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: BTreeMap::new(),
            storage_path: None,
            next_counter: 1,
        }
    }

    /// Open a registry backed by `path`.
    ///
    /// A missing file gives an empty registry. An unreadable or malformed file
    /// is logged and also gives an empty registry; the file is overwritten on
    /// the next mutation.
    #[must_use]
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut registry = if path.exists() {
            match read_json::<LedgerDocument>(path) {
                Ok(document) => Self::from_document(document),
                Err(e) => {
                    error!("Error loading execution records from {}: {}", path.display(), e);
                    Self::in_memory()
                }
            }
        } else {
            Self::in_memory()
        };

        registry.storage_path = Some(path.to_path_buf());
        debug!(
            "Opened execution ledger {} ({} records)",
            path.display(),
            registry.records.len()
        );
        registry
    }

    /// Rebuild a registry from its persisted form.
    ///
    /// Records that fail to parse are logged and skipped. The id counter
    /// resumes after the highest counter found.
    #[must_use]
    pub fn from_document(document: LedgerDocument) -> Self {
        let mut registry = Self::in_memory();

        for value in document.records {
            match serde_json::from_value::<ExecutionRecord>(value) {
                Ok(record) => {
                    if let Some(counter) = record.execution_id.counter() {
                        registry.next_counter =
                            registry.next_counter.max(counter.saturating_add(1));
                    }
                    registry.records.insert(record.execution_id.clone(), record);
                }
                Err(e) => error!("Error loading execution record: {}", e),
            }
        }

        registry
    }

    /// Render the registry in its persisted form.
    pub fn to_document(&self) -> Result<LedgerDocument, FabricaError> {
        let records = self
            .records
            .values()
            .map(ExecutionRecord::to_value)
            .collect::<Result<Vec<Value>, _>>()?;

        Ok(LedgerDocument {
            version: FORMAT_VERSION.to_string(),
            records,
            last_updated: Some(clock::utc_timestamp()),
        })
    }

    /// Write the registry to its backing file. No-op for in-memory registries.
    pub fn save(&self) -> Result<(), FabricaError> {
        match &self.storage_path {
            Some(path) => write_json_atomic(path, &self.to_document()?),
            None => Ok(()),
        }
    }

    /// Save after a mutation. Failures are logged; in-memory state is kept.
    fn persist(&self) {
        if let Err(e) = self.save() {
            error!("Error saving execution records: {}", e);
        }
    }

    fn next_id(&mut self) -> ExecutionId {
        let id = ExecutionId::generate(clock::epoch_millis(), self.next_counter);
        self.next_counter = self.next_counter.saturating_add(1);
        id
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Run one mutation under the ledger's file lock.
    ///
    /// With a backing file, the lock is taken and records written by other
    /// handles since the last mutation are merged in first, so ids are
    /// allocated past every counter on disk. A lock that cannot be taken is
    /// logged and the mutation runs unguarded.
    fn locked<T>(&mut self, mutation: impl FnOnce(&mut Self) -> T) -> T {
        let Some(path) = self.storage_path.clone() else {
            return mutation(self);
        };

        let mut lock = match DocumentLock::open(&path) {
            Ok(lock) => Some(lock),
            Err(e) => {
                error!("Cannot open ledger lock: {}", e);
                None
            }
        };
        let _guard = match lock.as_mut().map(DocumentLock::exclusive) {
            Some(Ok(guard)) => Some(guard),
            Some(Err(e)) => {
                error!("{}", e);
                None
            }
            None => None,
        };

        self.refresh(&path);
        mutation(self)
    }

    /// Merge the records currently on disk. Disk wins for ids known to both.
    fn refresh(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match read_json::<LedgerDocument>(path) {
            Ok(document) => {
                let disk = Self::from_document(document);
                self.next_counter = self.next_counter.max(disk.next_counter);
                self.records.extend(disk.records);
            }
            Err(e) => warn!("Cannot refresh ledger from {}: {}", path.display(), e),
        }
    }

    /// Start a new execution and return its id.
    ///
    /// The record is registered as a child of its parent when the parent is
    /// known; an unknown parent is kept as a dangling reference.
    pub fn start_execution(&mut self, request: ExecutionRequest) -> ExecutionId {
        self.locked(|registry| {
            let id = registry.next_id();

            if let Some(parent_id) = &request.parent {
                match registry.records.get_mut(parent_id) {
                    Some(parent) => parent.child_executions.push(id.clone()),
                    None => warn!("Parent execution {} not found for {}", parent_id, id),
                }
            }

            info!(
                "Started execution {}: {} on {}",
                id, request.kernel, request.doc_path
            );
            let record = ExecutionRecord::start(id.clone(), request, clock::epoch_seconds());
            registry.records.insert(id.clone(), record);
            registry.persist();
            id
        })
    }

    /// Look up a record that may still change state.
    fn active_record(
        &mut self,
        id: &ExecutionId,
        action: &str,
    ) -> Result<&mut ExecutionRecord, FabricaError> {
        let Some(record) = self.records.get_mut(id) else {
            warn!("Cannot {} unknown execution: {}", action, id);
            return Err(FabricaError::ExecutionNotFound(id.clone()));
        };
        if record.status.is_terminal() {
            warn!(
                "Cannot {} execution {}: already {}",
                action, id, record.status
            );
            return Err(FabricaError::TerminalExecution {
                id: id.clone(),
                status: record.status,
            });
        }
        Ok(record)
    }

    /// Mark an execution COMPLETED, store its output and seal it.
    ///
    /// The record is only changed once its seal has been computed.
    pub fn complete_execution(
        &mut self,
        id: &ExecutionId,
        output: Value,
        metrics: Option<Metadata>,
    ) -> Result<(), FabricaError> {
        self.locked(|registry| {
            let record = registry.active_record(id, "complete")?;
            let mut sealed = record.clone();
            sealed.status = ExecutionStatus::Completed;
            sealed.end_time = Some(clock::epoch_seconds().max(sealed.start_time));
            sealed.output = Some(output);
            sealed.metrics = metrics.unwrap_or_default();
            sealed.quantum_seal = Some(sealed.compute_seal()?);
            *record = sealed;

            info!(
                "Completed execution {} in {:.2}s",
                id,
                record.duration().unwrap_or_default()
            );
            registry.persist();
            Ok(())
        })
    }

    /// Mark an execution FAILED with the rendered error.
    pub fn fail_execution(
        &mut self,
        id: &ExecutionId,
        error: impl Display,
        metrics: Option<Metadata>,
    ) -> Result<(), FabricaError> {
        self.locked(|registry| {
            let record = registry.active_record(id, "fail")?;
            record.status = ExecutionStatus::Failed;
            record.end_time = Some(clock::epoch_seconds().max(record.start_time));
            record.error = Some(error.to_string());
            record.metrics = metrics.unwrap_or_default();

            warn!("Execution {} failed: {}", id, error);
            registry.persist();
            Ok(())
        })
    }

    /// Cancel a PENDING or RUNNING execution.
    pub fn cancel_execution(&mut self, id: &ExecutionId) -> Result<(), FabricaError> {
        self.locked(|registry| {
            let record = registry.active_record(id, "cancel")?;
            record.status = ExecutionStatus::Cancelled;
            record.end_time = Some(clock::epoch_seconds().max(record.start_time));

            info!("Cancelled execution: {}", id);
            registry.persist();
            Ok(())
        })
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn get_execution(&self, id: &ExecutionId) -> Option<&ExecutionRecord> {
        self.records.get(id)
    }

    /// The whole execution tree containing `id`.
    ///
    /// Climbs to the root ancestor, then walks the tree in pre-order with
    /// children in creation order. Unknown ids give an empty trace.
    #[must_use]
    pub fn get_trace(&self, id: &ExecutionId) -> Vec<&ExecutionRecord> {
        let Some(mut root) = self.records.get(id) else {
            return Vec::new();
        };

        let mut climbed: BTreeSet<&ExecutionId> = BTreeSet::from([&root.execution_id]);
        while let Some(parent) = root
            .parent_execution_id
            .as_ref()
            .and_then(|parent_id| self.records.get(parent_id))
        {
            if !climbed.insert(&parent.execution_id) {
                warn!("Execution lineage cycle detected at {}", parent.execution_id);
                break;
            }
            root = parent;
        }

        let mut trace = Vec::new();
        let mut emitted: BTreeSet<&ExecutionId> = BTreeSet::new();
        let mut stack = vec![root];

        while let Some(record) = stack.pop() {
            if !emitted.insert(&record.execution_id) {
                continue;
            }
            trace.push(record);
            stack.extend(
                record
                    .child_executions
                    .iter()
                    .rev()
                    .filter_map(|child| self.records.get(child)),
            );
        }

        trace
    }

    #[must_use]
    pub fn get_stats(&self) -> ExecutionStats {
        ExecutionStats::collect(self.records.values())
    }

    /// Recompute a completed record's seal and compare it with the stored one.
    #[must_use]
    pub fn verify_seal(&self, id: &ExecutionId) -> bool {
        let Some(record) = self.records.get(id) else {
            return false;
        };
        match (&record.quantum_seal, record.compute_seal()) {
            (Some(stored), Ok(computed)) => *stored == computed,
            _ => false,
        }
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &ExecutionRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }
}

// =============================================================================
// TESTS
// =============================================================================
