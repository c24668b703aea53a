//! # CLI Command Implementations
//!
//! Each command loads what it needs from the configured paths, runs one core
//! operation and prints the result. Braid edits happen under the braid's
//! sidecar lock and are written back before the command returns; the ledger
//! persists itself on every mutation.

use super::{ExportFormat, QueryCommands};
use crate::config::FabricaConfig;
use fabrica_core::formats::read_json;
use fabrica_core::{
    BraidSnapshot, Cascade, CascadeReport, ChainSync, DocumentId, DocumentLock,
    ExecutionId, ExecutionRecord, ExecutionRegistry, FabricaError, FileMetadataKernel,
    LedgerDocument, LinkType, Metadata, ScrollLinker, SemanticBraid, UnavailableEnricher,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// =============================================================================
// HELPERS
// =============================================================================

/// Load the braid snapshot, or start an empty braid if none exists yet.
pub fn load_braid(path: &Path) -> Result<SemanticBraid, FabricaError> {
    if !path.exists() {
        return Ok(SemanticBraid::new());
    }
    BraidSnapshot::read(path).map(SemanticBraid::from)
}

/// Write the braid snapshot.
pub fn save_braid(path: &Path, braid: &SemanticBraid) -> Result<(), FabricaError> {
    BraidSnapshot::from(braid).write(path)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), FabricaError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| FabricaError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn chain_sync(config: &FabricaConfig) -> ChainSync {
    ChainSync::new(&config.ledger_path, &config.sync_log_path)
}

/// Attach the built-in kernels, in run order.
fn with_builtin_kernels(cascade: Cascade) -> Cascade {
    cascade.with_kernel(FileMetadataKernel)
}

/// Parse `--context` into the metadata every cascade run starts from.
///
/// An empty string is an empty context; anything else must be a JSON object.
pub fn parse_context(text: &str) -> Result<Metadata, FabricaError> {
    if text.trim().is_empty() {
        return Ok(Metadata::new());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FabricaError::DeserializationError(format!(
            "context must be a JSON object, got {}",
            other
        ))),
        Err(e) => Err(FabricaError::DeserializationError(format!(
            "invalid context JSON: {}",
            e
        ))),
    }
}

fn require_document(braid: &SemanticBraid, id: &DocumentId) -> Result<(), FabricaError> {
    if braid.contains(id) {
        Ok(())
    } else {
        Err(FabricaError::DocumentNotFound(id.clone()))
    }
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show braid, ledger and sync status.
pub fn cmd_status(config: &FabricaConfig, json_mode: bool) -> Result<(), FabricaError> {
    let braid = load_braid(&config.braid_path)?;
    let registry = ExecutionRegistry::open(&config.ledger_path);
    let sync = chain_sync(config);
    let latest = sync.get_latest();
    let synced = sync.verify();

    if json_mode {
        return print_json(&json!({
            "braid_path": config.braid_path.display().to_string(),
            "ledger_path": config.ledger_path.display().to_string(),
            "documents": braid.node_count(),
            "links": braid.edge_count(),
            "executions": registry.len(),
            "synchronized": synced,
            "latest_sync": latest,
        }));
    }

    println!("Fabrica Status");
    println!("==============");
    println!("Braid:  {}", config.braid_path.display());
    println!("Ledger: {}", config.ledger_path.display());
    println!();
    println!("Documents:  {}", braid.node_count());
    println!("Links:      {}", braid.edge_count());
    println!("Executions: {}", registry.len());
    match latest {
        Some(entry) => println!("Last sync:  {} ({})", entry.timestamp, short_hash(&entry.registry_hash)),
        None => println!("Last sync:  never"),
    }
    println!("In sync:    {}", if synced { "yes" } else { "no" });

    Ok(())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

// =============================================================================
// PROCESS COMMAND
// =============================================================================

/// Run documents through the cascade and save the braid.
pub fn cmd_process(
    config: &FabricaConfig,
    json_mode: bool,
    files: &[PathBuf],
    context: Option<&str>,
    no_enrichment: bool,
    no_sync: bool,
) -> Result<(), FabricaError> {
    let context = context.map(parse_context).transpose()?;
    let mut cascade_config = config.cascade.clone();
    cascade_config.enable_enrichment &= !no_enrichment;
    cascade_config.enable_sync &= !no_sync;

    let mut lock = DocumentLock::open(&config.braid_path)?;
    let _guard = lock.exclusive()?;

    let braid = load_braid(&config.braid_path)?;
    let registry = ExecutionRegistry::open(&config.ledger_path);
    let mut cascade = with_builtin_kernels(Cascade::new(braid, registry, cascade_config))
        .with_enricher(UnavailableEnricher::new("no enrichment provider configured"))
        .with_sync(chain_sync(config))
        .with_scroll_linker(ScrollLinker::new(&config.codex_path));

    let reports: Vec<CascadeReport> = files
        .iter()
        .map(|file| cascade.process_document(file, context.clone()))
        .collect();

    let (braid, _registry) = cascade.into_parts();
    save_braid(&config.braid_path, &braid)?;

    let failed = reports.iter().filter(|r| !r.success).count();
    if failed > 0 {
        warn!("{} of {} documents failed", failed, reports.len());
    }
    info!("Processed {} documents", reports.len());

    if json_mode {
        return print_json(&reports);
    }

    for report in &reports {
        let status = if report.success { "ok" } else { "FAILED" };
        println!("[{}] {}", status, report.document);
        if let Some(id) = &report.document_id {
            println!("  document:  {}", id);
        }
        println!("  execution: {}", report.root_execution);
        println!("  kernels:   {}", report.kernel_outputs.len());
        println!("  links:     {}", report.links_created);
        if let Some(sync) = &report.sync {
            println!("  sync:      {}", sync.message);
        }
        if let Some(error) = &report.error {
            println!("  error:     {}", error);
        }
    }

    Ok(())
}

// =============================================================================
// LEDGER COMMANDS
// =============================================================================

/// Show the execution tree containing an execution.
pub fn cmd_trace(config: &FabricaConfig, json_mode: bool, id: &str) -> Result<(), FabricaError> {
    let registry = ExecutionRegistry::open(&config.ledger_path);
    let id = ExecutionId::new(id);
    let trace = registry.get_trace(&id);
    if trace.is_empty() {
        return Err(FabricaError::ExecutionNotFound(id));
    }

    if json_mode {
        let values = trace
            .iter()
            .map(|record| record.to_value())
            .collect::<Result<Vec<_>, _>>()?;
        return print_json(&values);
    }

    let mut depths: BTreeMap<&ExecutionId, usize> = BTreeMap::new();
    for record in trace {
        let depth = record
            .parent_execution_id
            .as_ref()
            .and_then(|parent| depths.get(parent))
            .map_or(0, |d| d + 1);
        depths.insert(&record.execution_id, depth);

        let marker = if record.execution_id == id { "*" } else { " " };
        println!(
            "{}{}{} [{}] {} {}",
            marker,
            "  ".repeat(depth),
            record.execution_id,
            record.status,
            record.kernel_name,
            record.doc_path
        );
    }

    Ok(())
}

/// Show ledger statistics.
pub fn cmd_stats(config: &FabricaConfig, json_mode: bool) -> Result<(), FabricaError> {
    let stats = ExecutionRegistry::open(&config.ledger_path).get_stats();

    if json_mode {
        return print_json(&stats);
    }

    println!("Execution Statistics");
    println!("====================");
    println!("Total:     {}", stats.total);
    println!("Pending:   {}", stats.pending);
    println!("Running:   {}", stats.running);
    println!("Completed: {}", stats.completed);
    println!("Failed:    {}", stats.failed);
    println!("Cancelled: {}", stats.cancelled);
    println!();
    println!(
        "Duration:  avg {:.3}s, min {:.3}s, max {:.3}s",
        stats.avg_duration, stats.min_duration, stats.max_duration
    );
    println!("Kernels:   {}", stats.kernels_used);
    println!("Documents: {}", stats.documents_processed);

    Ok(())
}

/// Show one execution, or the newest `limit` executions.
pub fn cmd_executions(
    config: &FabricaConfig,
    json_mode: bool,
    id: Option<&str>,
    limit: usize,
) -> Result<(), FabricaError> {
    let registry = ExecutionRegistry::open(&config.ledger_path);

    if let Some(id) = id {
        let id = ExecutionId::new(id);
        let record = registry
            .get_execution(&id)
            .ok_or_else(|| FabricaError::ExecutionNotFound(id.clone()))?;
        if json_mode {
            return print_json(&json!({ "found": true, "execution": record.to_value()? }));
        }
        print_execution(record);
        return Ok(());
    }

    let mut records: Vec<&ExecutionRecord> = registry.records().collect();
    records.sort_by(|a, b| {
        b.start_time
            .total_cmp(&a.start_time)
            .then_with(|| b.execution_id.cmp(&a.execution_id))
    });
    let total = records.len();
    records.truncate(limit);

    if json_mode {
        let last_updated = if config.ledger_path.exists() {
            read_json::<LedgerDocument>(&config.ledger_path)?.last_updated
        } else {
            None
        };
        let executions = records
            .iter()
            .map(|record| record.to_value())
            .collect::<Result<Vec<_>, _>>()?;
        return print_json(&json!({
            "count": total,
            "executions": executions,
            "last_updated": last_updated,
        }));
    }

    println!("Executions ({} of {})", records.len(), total);
    for record in records {
        println!(
            "{} [{}] {} {}",
            record.execution_id, record.status, record.kernel_name, record.doc_path
        );
    }
    Ok(())
}

fn print_execution(record: &ExecutionRecord) {
    println!("Execution: {}", record.execution_id);
    println!("Kernel:    {}", record.kernel_name);
    println!("Document:  {}", record.doc_path);
    println!("Status:    {}", record.status);
    if let Some(parent) = &record.parent_execution_id {
        println!("Parent:    {}", parent);
    }
    if !record.child_executions.is_empty() {
        println!("Children:  {}", record.child_executions.len());
    }
    if let Some(duration) = record.duration() {
        println!("Duration:  {:.3}s", duration);
    }
    if let Some(seal) = &record.quantum_seal {
        println!("Seal:      {}", short_hash(seal));
    }
    if let Some(error) = &record.error {
        println!("Error:     {}", error);
    }
}

/// Write every execution to a JSON or CSV file.
pub fn cmd_export(
    config: &FabricaConfig,
    json_mode: bool,
    output: &Path,
    format: ExportFormat,
) -> Result<(), FabricaError> {
    let registry = ExecutionRegistry::open(&config.ledger_path);
    let values = registry
        .records()
        .map(ExecutionRecord::to_value)
        .collect::<Result<Vec<_>, _>>()?;

    match format {
        ExportFormat::Json => {
            let text = serde_json::to_string_pretty(&values)
                .map_err(|e| FabricaError::SerializationError(e.to_string()))?;
            fs::write(output, text).map_err(|e| {
                FabricaError::IoError(format!("Failed to write {}: {}", output.display(), e))
            })?;
        }
        ExportFormat::Csv => write_csv(output, &values)?,
    }
    info!("Exported {} executions to {}", values.len(), output.display());

    if json_mode {
        return print_json(&json!({
            "exported": values.len(),
            "output": output.display().to_string(),
            "format": format.as_str(),
        }));
    }
    println!("Exported {} executions to {}", values.len(), output.display());
    Ok(())
}

/// One row per execution. Columns are the sorted union of field names;
/// strings are written raw, nulls as empty cells and anything else as JSON.
fn write_csv(output: &Path, values: &[Value]) -> Result<(), FabricaError> {
    let csv_error =
        |e: csv::Error| FabricaError::IoError(format!("Failed to write {}: {}", output.display(), e));

    let columns: BTreeSet<&str> = values
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|record| record.keys().map(String::as_str))
        .collect();

    let mut writer = csv::Writer::from_path(output).map_err(csv_error)?;
    if !columns.is_empty() {
        writer.write_record(&columns).map_err(csv_error)?;
    }
    for value in values {
        let row: Vec<String> = columns
            .iter()
            .map(|column| match value.get(*column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&row).map_err(csv_error)?;
    }
    writer
        .flush()
        .map_err(|e| FabricaError::IoError(format!("Failed to write {}: {}", output.display(), e)))
}

/// List the kernels `process` runs, in order.
pub fn cmd_kernels(config: &FabricaConfig, json_mode: bool) -> Result<(), FabricaError> {
    let cascade = with_builtin_kernels(Cascade::new(
        SemanticBraid::new(),
        ExecutionRegistry::in_memory(),
        config.cascade.clone(),
    ));

    if json_mode {
        let kernels: Vec<Value> = cascade
            .kernels()
            .map(|k| json!({ "name": k.name(), "description": k.description() }))
            .collect();
        return print_json(&kernels);
    }

    println!("Available Kernels");
    println!("=================");
    for kernel in cascade.kernels() {
        println!("{}: {}", kernel.name(), kernel.description());
    }
    Ok(())
}

/// Recompute and check an execution seal.
pub fn cmd_verify_seal(config: &FabricaConfig, json_mode: bool, id: &str) -> Result<(), FabricaError> {
    let registry = ExecutionRegistry::open(&config.ledger_path);
    let id = ExecutionId::new(id);
    let record = registry
        .get_execution(&id)
        .ok_or_else(|| FabricaError::ExecutionNotFound(id.clone()))?;
    let valid = registry.verify_seal(&id);

    if json_mode {
        return print_json(&json!({
            "execution_id": id,
            "status": record.status,
            "seal": record.quantum_seal,
            "valid": valid,
        }));
    }

    if valid {
        println!("Seal valid for {}", id);
    } else {
        println!("Seal INVALID for {} (status: {})", id, record.status);
    }
    Ok(())
}

// =============================================================================
// SYNC COMMANDS
// =============================================================================

/// Record the current ledger state in the sync log.
pub fn cmd_sync(config: &FabricaConfig, json_mode: bool, force: bool) -> Result<(), FabricaError> {
    let outcome = chain_sync(config).sync(force);

    if json_mode {
        print_json(&outcome)?;
    } else {
        println!("{}", outcome.message);
    }

    if outcome.success {
        Ok(())
    } else {
        Err(FabricaError::IoError(outcome.message))
    }
}

/// Check that the current ledger state is logged.
pub fn cmd_verify(config: &FabricaConfig, json_mode: bool) -> Result<(), FabricaError> {
    let sync = chain_sync(config);
    let valid = sync.verify();

    if json_mode {
        return print_json(&json!({
            "ledger_path": sync.ledger_path().display().to_string(),
            "synchronized": valid,
        }));
    }

    if valid {
        println!("Ledger state is recorded in {}", sync.log_path().display());
    } else {
        println!("Ledger state is NOT recorded in {}", sync.log_path().display());
    }
    Ok(())
}

/// Show the newest sync entry.
pub fn cmd_latest(config: &FabricaConfig, json_mode: bool) -> Result<(), FabricaError> {
    let latest = chain_sync(config).get_latest();

    if json_mode {
        return print_json(&latest);
    }

    match latest {
        Some(entry) => {
            println!("Hash:      {}", entry.registry_hash);
            println!("Timestamp: {}", entry.timestamp);
            println!("Ledger:    {}", entry.registry_path);
        }
        None => println!("No sync entries"),
    }
    Ok(())
}

// =============================================================================
// ANCHOR COMMANDS
// =============================================================================

/// Anchor a document in the codex chain.
pub fn cmd_anchor(
    config: &FabricaConfig,
    json_mode: bool,
    file: &Path,
    operator: &str,
) -> Result<(), FabricaError> {
    let entry = ScrollLinker::new(&config.codex_path).link(file, Metadata::new(), operator)?;

    if json_mode {
        return print_json(&entry);
    }
    println!("{}", entry.quantum_anchor);
    Ok(())
}

/// Check a document against its codex anchor.
pub fn cmd_verify_anchor(config: &FabricaConfig, json_mode: bool, file: &Path) -> Result<(), FabricaError> {
    let valid = ScrollLinker::new(&config.codex_path).verify(file);

    if json_mode {
        return print_json(&json!({
            "document": file.display().to_string(),
            "valid": valid,
        }));
    }

    if valid {
        println!("Anchor matches {}", file.display());
    } else {
        println!("Anchor does NOT match {}", file.display());
    }
    Ok(())
}

// =============================================================================
// BRAID COMMANDS
// =============================================================================

/// Link two documents and save the braid.
pub fn cmd_link(
    config: &FabricaConfig,
    json_mode: bool,
    source: &str,
    target: &str,
    link_type: &str,
    weight: f64,
) -> Result<(), FabricaError> {
    let mut lock = DocumentLock::open(&config.braid_path)?;
    let _guard = lock.exclusive()?;

    let mut braid = load_braid(&config.braid_path)?;
    let link_type = LinkType::new(link_type)?;
    let symmetric = link_type.is_symmetric();

    let link = braid
        .link(
            &DocumentId::new(source),
            &DocumentId::new(target),
            link_type,
            weight,
            Metadata::new(),
        )?
        .clone();
    save_braid(&config.braid_path, &braid)?;

    if json_mode {
        return print_json(&json!({
            "source": link.source(),
            "target": link.target(),
            "link_type": link.link_type(),
            "weight": link.weight(),
            "symmetric": symmetric,
        }));
    }

    let arrow = if symmetric { "<->" } else { "->" };
    println!(
        "{} {} {} [{}, {:.2}]",
        link.source(),
        arrow,
        link.target(),
        link.link_type(),
        link.weight()
    );
    Ok(())
}

/// Tag a document and save the braid.
pub fn cmd_tag(config: &FabricaConfig, json_mode: bool, id: &str, tag: &str) -> Result<(), FabricaError> {
    let mut lock = DocumentLock::open(&config.braid_path)?;
    let _guard = lock.exclusive()?;

    let mut braid = load_braid(&config.braid_path)?;
    let id = DocumentId::new(id);
    braid.tag_document(&id, tag)?;
    save_braid(&config.braid_path, &braid)?;

    if json_mode {
        return print_json(&json!({ "id": id, "tag": tag.to_lowercase() }));
    }
    println!("Tagged {} with {}", id, tag.to_lowercase());
    Ok(())
}

/// Remove a document and every link to it, then save the braid.
pub fn cmd_remove(config: &FabricaConfig, json_mode: bool, id: &str) -> Result<(), FabricaError> {
    let mut lock = DocumentLock::open(&config.braid_path)?;
    let _guard = lock.exclusive()?;

    let mut braid = load_braid(&config.braid_path)?;
    let id = DocumentId::new(id);
    let removed = braid
        .remove_document(&id)
        .ok_or_else(|| FabricaError::DocumentNotFound(id.clone()))?;
    save_braid(&config.braid_path, &braid)?;

    if json_mode {
        return print_json(&json!({ "removed": id, "path": removed.path() }));
    }
    println!("Removed {} ({})", id, removed.path());
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Execute a braid query.
pub fn cmd_query(config: &FabricaConfig, json_mode: bool, query: &QueryCommands) -> Result<(), FabricaError> {
    let braid = load_braid(&config.braid_path)?;

    match query {
        QueryCommands::Related {
            id,
            link_type,
            min_weight,
        } => {
            let link_type = link_type.as_deref().map(LinkType::new).transpose()?;
            let related = braid.find_related(&DocumentId::new(id.as_str()), link_type.as_ref(), *min_weight)?;

            if json_mode {
                let rows: Vec<_> = related
                    .iter()
                    .map(|(node, weight)| json!({ "id": node.id(), "title": node.title(), "weight": weight }))
                    .collect();
                return print_json(&rows);
            }
            if related.is_empty() {
                println!("No related documents");
            }
            for (node, weight) in related {
                println!("{:.3}  {}  {}", weight, node.id(), node.title());
            }
        }
        QueryCommands::Path {
            source,
            target,
            max_hops,
        } => {
            let (source, target) = (DocumentId::new(source.as_str()), DocumentId::new(target.as_str()));
            require_document(&braid, &source)?;
            require_document(&braid, &target)?;
            let path = braid.shortest_path(&source, &target, *max_hops);

            if json_mode {
                let ids: Option<Vec<&DocumentId>> = path.as_ref().map(|p| p.iter().map(|n| n.id()).collect());
                return print_json(&json!({ "found": ids.is_some(), "path": ids }));
            }
            match path {
                Some(path) => {
                    let ids: Vec<&str> = path.iter().map(|n| n.id().as_str()).collect();
                    println!("{}", ids.join(" -> "));
                }
                None => println!("No path within {} hops", max_hops),
            }
        }
        QueryCommands::Tag { tag } => {
            let nodes = braid.find_by_tag(tag);

            if json_mode {
                let rows: Vec<_> = nodes
                    .iter()
                    .map(|node| json!({ "id": node.id(), "path": node.path() }))
                    .collect();
                return print_json(&rows);
            }
            if nodes.is_empty() {
                println!("No documents tagged {}", tag.to_lowercase());
            }
            for node in nodes {
                println!("{}  {}", node.id(), node.path());
            }
        }
        QueryCommands::Components => {
            let components = braid.connected_components();

            if json_mode {
                return print_json(&components);
            }
            for (i, component) in components.iter().enumerate() {
                let ids: Vec<&str> = component.iter().map(DocumentId::as_str).collect();
                println!("{}: {}", i + 1, ids.join(", "));
            }
        }
    }

    Ok(())
}
