//! Execution records and the requests that create them.

use crate::formats::canonical_digest;
use crate::{ExecutionId, ExecutionStatus, FabricaError, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// EXECUTION REQUEST
// =============================================================================

/// Everything needed to start an execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub kernel: String,
    pub doc_path: String,
    pub input_metadata: Metadata,
    pub context: Metadata,
    pub parent: Option<ExecutionId>,
}

impl ExecutionRequest {
    #[must_use]
    pub fn new(kernel: impl Into<String>, doc_path: impl Into<String>) -> Self {
        Self {
            kernel: kernel.into(),
            doc_path: doc_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_input(mut self, input_metadata: Metadata) -> Self {
        self.input_metadata = input_metadata;
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: Metadata) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: ExecutionId) -> Self {
        self.parent = Some(parent);
        self
    }
}

// =============================================================================
// EXECUTION RECORD
// =============================================================================

/// One kernel execution as stored in the ledger.
///
/// `child_executions` lists children in creation order. `quantum_seal` is set
/// only when the record completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub kernel_name: String,
    pub doc_path: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub input_metadata: Metadata,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub context: Metadata,
    #[serde(default)]
    pub quantum_seal: Option<String>,
    #[serde(default)]
    pub parent_execution_id: Option<ExecutionId>,
    #[serde(default)]
    pub child_executions: Vec<ExecutionId>,
    #[serde(default)]
    pub metrics: Metadata,
}

impl ExecutionRecord {
    /// A fresh RUNNING record for a request.
    #[must_use]
    pub fn start(id: ExecutionId, request: ExecutionRequest, start_time: f64) -> Self {
        Self {
            execution_id: id,
            kernel_name: request.kernel,
            doc_path: request.doc_path,
            start_time,
            end_time: None,
            status: ExecutionStatus::Running,
            input_metadata: request.input_metadata,
            output: None,
            error: None,
            context: request.context,
            quantum_seal: None,
            parent_execution_id: request.parent,
            child_executions: Vec::new(),
            metrics: Metadata::new(),
        }
    }

    /// Seconds between start and end, once the record has ended.
    #[must_use]
    pub fn duration(&self) -> Option<f64> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Compute the seal over the record's durable fields.
    ///
    /// SHA-256 over the canonical JSON of execution id, kernel, document path,
    /// start and end time, the digests of input metadata and output (`{}` when
    /// there is no output) and the parent id.
    pub fn compute_seal(&self) -> Result<String, FabricaError> {
        let input_hash = canonical_digest(&self.input_metadata)?;
        let output_hash = match &self.output {
            Some(output) => canonical_digest(output)?,
            None => canonical_digest(&Metadata::new())?,
        };

        canonical_digest(&json!({
            "execution_id": self.execution_id,
            "kernel": self.kernel_name,
            "doc_path": self.doc_path,
            "start_time": self.start_time,
            "end_time": self.end_time,
            "input_hash": input_hash,
            "output_hash": output_hash,
            "parent_id": self.parent_execution_id,
        }))
    }

    /// The persisted form: the record's fields plus a computed `duration`.
    pub fn to_value(&self) -> Result<Value, FabricaError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| FabricaError::SerializationError(e.to_string()))?;
        if let Value::Object(map) = &mut value {
            map.insert("duration".to_string(), json!(self.duration()));
        }
        Ok(value)
    }
}
