//! # Semantic Braid
//!
//! The document relationship graph of the Fabrica core.
//!
//! Nodes live in a `BTreeMap` arena keyed by `DocumentId`; each node owns its
//! outgoing links and links refer to their endpoints by id. Iteration order
//! is therefore deterministic, and removing a node only has to prune the
//! links that point at it.

use crate::formats::{read_json, write_json_atomic};
use crate::primitives::{DEFAULT_DOCUMENT_TYPE, FORMAT_VERSION};
use crate::{DocumentId, FabricaError, LinkType, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

/// Clamp a raw weight into `[0.0, 1.0]`. NaN is treated as no weight.
fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}

// =============================================================================
// DOCUMENT LINK
// =============================================================================

/// A typed, weighted relationship from one document to another.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLink {
    source: DocumentId,
    target: DocumentId,
    link_type: LinkType,
    weight: f64,
    metadata: Metadata,
}

impl DocumentLink {
    /// Create a link. The weight is clamped into `[0.0, 1.0]`.
    #[must_use]
    pub fn new(
        source: DocumentId,
        target: DocumentId,
        link_type: LinkType,
        weight: f64,
        metadata: Metadata,
    ) -> Self {
        Self {
            source,
            target,
            link_type,
            weight: clamp_weight(weight),
            metadata,
        }
    }

    /// The same relationship pointing the other way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
            link_type: self.link_type.clone(),
            weight: self.weight,
            metadata: self.metadata.clone(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &DocumentId {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &DocumentId {
        &self.target
    }

    #[must_use]
    pub fn link_type(&self) -> &LinkType {
        &self.link_type
    }

    /// The clamped weight, always within `[0.0, 1.0]`.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

// =============================================================================
// DOCUMENT NODE
// =============================================================================

/// A document in the braid.
///
/// Nodes are only ever handed out by shared reference; tags and embeddings
/// are changed through the braid so the tag index stays in step.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    id: DocumentId,
    path: String,
    title: String,
    doc_type: String,
    metadata: Metadata,
    tags: BTreeSet<String>,
    embeddings: BTreeMap<String, Vec<f32>>,
    links: Vec<DocumentLink>,
}

impl DocumentNode {
    /// Build a node from a path and its metadata.
    ///
    /// `title` defaults to the file stem, `type` to `"document"`, and the id
    /// is derived from path, title and type when none is given. Tags listed
    /// under `tags` (an array of strings or a single string) are lower-cased.
    #[must_use]
    pub fn new(id: Option<DocumentId>, path: &str, metadata: Metadata) -> Self {
        let title = metadata
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                Path::new(path)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string())
            });
        let doc_type = metadata
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_DOCUMENT_TYPE)
            .to_string();

        let tags = match metadata.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase)
                .collect(),
            Some(Value::String(tag)) => BTreeSet::from([tag.to_lowercase()]),
            _ => BTreeSet::new(),
        };

        let id = id
            .filter(|id| !id.as_str().is_empty())
            .unwrap_or_else(|| DocumentId::derive(path, &title, &doc_type));

        Self {
            id,
            path: path.to_string(),
            title,
            doc_type,
            metadata,
            tags,
            embeddings: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Case-insensitive tag check.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_lowercase())
    }

    /// The stored vector for an embedding model.
    #[must_use]
    pub fn embedding(&self, model: &str) -> Option<&[f32]> {
        self.embeddings.get(model).map(Vec::as_slice)
    }

    /// Outgoing links in creation order, optionally filtered by type.
    pub fn links<'a>(
        &'a self,
        link_type: Option<&'a LinkType>,
    ) -> impl Iterator<Item = &'a DocumentLink> + 'a {
        self.links
            .iter()
            .filter(move |link| link_type.is_none_or(|t| &link.link_type == t))
    }
}

// =============================================================================
// SEMANTIC BRAID
// =============================================================================

/// The document graph.
#[derive(Debug, Clone, Default)]
pub struct SemanticBraid {
    /// Node arena: DocumentId -> DocumentNode
    nodes: BTreeMap<DocumentId, DocumentNode>,

    /// Every link type used so far.
    link_types: BTreeSet<LinkType>,

    /// Lower-cased tag -> documents carrying it.
    tag_index: BTreeMap<String, BTreeSet<DocumentId>>,
}

impl SemanticBraid {
    /// Create an empty braid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, replacing any node with the same id.
    ///
    /// A replaced node's outgoing links are dropped, not merged. Links from
    /// other documents that target the id keep pointing at it.
    pub fn add_document(
        &mut self,
        id: Option<DocumentId>,
        path: &str,
        metadata: Metadata,
    ) -> &DocumentNode {
        let node = DocumentNode::new(id, path, metadata);
        let id = node.id.clone();

        if let Some(previous) = self.nodes.remove(&id) {
            warn!(
                "Document with ID {} already exists, replacing ({} outgoing links dropped)",
                id,
                previous.links.len()
            );
            self.unindex_tags(&previous);
        }

        for tag in &node.tags {
            self.tag_index
                .entry(tag.clone())
                .or_default()
                .insert(id.clone());
        }

        debug!("Added document {} ({})", id, node.path);
        self.nodes.entry(id).or_insert(node)
    }

    /// Look up a document by id.
    #[must_use]
    pub fn get_document(&self, id: &DocumentId) -> Option<&DocumentNode> {
        self.nodes.get(id)
    }

    /// Look up a document by its path. The lowest id wins if several match.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<&DocumentNode> {
        self.nodes.values().find(|node| node.path == path)
    }

    /// Check if the braid contains a document.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All documents in id order.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentNode> {
        self.nodes.values()
    }

    /// Every link type used so far, in sorted order.
    pub fn link_types(&self) -> impl Iterator<Item = &LinkType> {
        self.link_types.iter()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of stored links, synthesized reverse links included.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.links.len()).sum()
    }

    /// Create a link between two documents.
    ///
    /// Symmetric link types also create the reverse link. The reverse link is
    /// built directly and does not trigger another reversal.
    pub fn link(
        &mut self,
        source: &DocumentId,
        target: &DocumentId,
        link_type: LinkType,
        weight: f64,
        metadata: Metadata,
    ) -> Result<&DocumentLink, FabricaError> {
        for endpoint in [source, target] {
            if !self.nodes.contains_key(endpoint) {
                warn!("Could not create link: document {} not found", endpoint);
                return Err(FabricaError::DocumentNotFound(endpoint.clone()));
            }
        }

        let link = DocumentLink::new(
            source.clone(),
            target.clone(),
            link_type.clone(),
            weight,
            metadata,
        );

        if link_type.is_symmetric() {
            let reverse = link.reversed();
            if let Some(node) = self.nodes.get_mut(target) {
                node.links.push(reverse);
            }
        }
        self.link_types.insert(link_type);

        let node = self
            .nodes
            .get_mut(source)
            .ok_or_else(|| FabricaError::DocumentNotFound(source.clone()))?;
        node.links.push(link);
        node.links
            .last()
            .ok_or_else(|| FabricaError::DocumentNotFound(source.clone()))
    }

    /// Documents linked from `id`, strongest first.
    ///
    /// Links are filtered by type (if given) and by an inclusive minimum
    /// weight. The sort is stable, so equal weights keep link creation order.
    pub fn find_related(
        &self,
        id: &DocumentId,
        link_type: Option<&LinkType>,
        min_weight: f64,
    ) -> Result<Vec<(&DocumentNode, f64)>, FabricaError> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| FabricaError::DocumentNotFound(id.clone()))?;

        let mut related: Vec<(&DocumentNode, f64)> = node
            .links(link_type)
            .filter(|link| link.weight >= min_weight)
            .filter_map(|link| self.nodes.get(&link.target).map(|t| (t, link.weight)))
            .collect();

        related.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(related)
    }

    /// Breadth-first shortest path over outgoing links.
    ///
    /// Nodes are expanded while their BFS level is at most `max_hops`, so the
    /// budget bounds search depth rather than the number of links examined.
    /// Returns `None` if either endpoint is missing or no path exists within
    /// the budget.
    #[must_use]
    pub fn shortest_path(
        &self,
        source: &DocumentId,
        target: &DocumentId,
        max_hops: usize,
    ) -> Option<Vec<&DocumentNode>> {
        let start = self.nodes.get(source)?;
        if !self.nodes.contains_key(target) {
            return None;
        }
        if source == target {
            return Some(vec![start]);
        }

        let mut visited: BTreeSet<&DocumentId> = BTreeSet::from([source]);
        let mut previous: BTreeMap<&DocumentId, &DocumentId> = BTreeMap::new();
        let mut queue: VecDeque<(&DocumentNode, usize)> = VecDeque::from([(start, 0usize)]);

        while let Some((current, level)) = queue.pop_front() {
            if level > max_hops {
                continue;
            }

            for link in &current.links {
                let Some(neighbor) = self.nodes.get(&link.target) else {
                    continue;
                };
                if !visited.insert(&neighbor.id) {
                    continue;
                }
                previous.insert(&neighbor.id, &current.id);

                if &neighbor.id == target {
                    return self.rebuild_path(&previous, source, target);
                }
                queue.push_back((neighbor, level.saturating_add(1)));
            }
        }

        None
    }

    /// Walk predecessor links back from `target` to `source`.
    fn rebuild_path(
        &self,
        previous: &BTreeMap<&DocumentId, &DocumentId>,
        source: &DocumentId,
        target: &DocumentId,
    ) -> Option<Vec<&DocumentNode>> {
        let mut path = vec![self.nodes.get(target)?];
        let mut current = target;
        while current != source {
            current = *previous.get(current)?;
            path.push(self.nodes.get(current)?);
        }
        path.reverse();
        Some(path)
    }

    /// Documents carrying a tag, case-insensitive, in id order.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<&DocumentNode> {
        self.tag_index
            .get(&tag.to_lowercase())
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Add a tag to a document and index it.
    pub fn tag_document(&mut self, id: &DocumentId, tag: &str) -> Result<(), FabricaError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| FabricaError::DocumentNotFound(id.clone()))?;
        let tag = tag.to_lowercase();
        node.tags.insert(tag.clone());
        self.tag_index.entry(tag).or_default().insert(id.clone());
        Ok(())
    }

    /// Store an embedding vector for a document under a model name.
    pub fn set_embedding(
        &mut self,
        id: &DocumentId,
        model: &str,
        vector: Vec<f32>,
    ) -> Result<(), FabricaError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| FabricaError::DocumentNotFound(id.clone()))?;
        node.embeddings.insert(model.to_string(), vector);
        Ok(())
    }

    /// Remove a document together with every link that targets it.
    pub fn remove_document(&mut self, id: &DocumentId) -> Option<DocumentNode> {
        let removed = self.nodes.remove(id)?;
        self.unindex_tags(&removed);

        let mut pruned = 0usize;
        for node in self.nodes.values_mut() {
            let before = node.links.len();
            node.links.retain(|link| &link.target != id);
            pruned = pruned.saturating_add(before.saturating_sub(node.links.len()));
        }

        info!("Removed document {} ({} incoming links pruned)", id, pruned);
        Some(removed)
    }

    /// Weakly connected components, each sorted, ordered by their first id.
    #[must_use]
    pub fn connected_components(&self) -> Vec<Vec<DocumentId>> {
        let mut adjacency: BTreeMap<&DocumentId, BTreeSet<&DocumentId>> = BTreeMap::new();
        for node in self.nodes.values() {
            adjacency.entry(&node.id).or_default();
            for link in &node.links {
                if self.nodes.contains_key(&link.target) {
                    adjacency.entry(&node.id).or_default().insert(&link.target);
                    adjacency.entry(&link.target).or_default().insert(&node.id);
                }
            }
        }

        let mut seen: BTreeSet<&DocumentId> = BTreeSet::new();
        let mut components = Vec::new();

        for &start in adjacency.keys() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = BTreeSet::from([start]);
            let mut queue = VecDeque::from([start]);

            while let Some(current) = queue.pop_front() {
                for &neighbor in adjacency.get(current).into_iter().flatten() {
                    if seen.insert(neighbor) {
                        component.insert(neighbor);
                        queue.push_back(neighbor);
                    }
                }
            }

            components.push(component.into_iter().cloned().collect());
        }

        components
    }

    fn unindex_tags(&mut self, node: &DocumentNode) {
        for tag in &node.tags {
            if let Some(ids) = self.tag_index.get_mut(tag) {
                ids.remove(&node.id);
                if ids.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
    }
}

// =============================================================================
// SERIALIZATION SUPPORT
// =============================================================================

/// A document as stored in a braid snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub id: DocumentId,
    pub path: String,
    pub title: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub embeddings: BTreeMap<String, Vec<f32>>,
}

/// A link as stored in a braid snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotLink {
    pub source: DocumentId,
    pub target: DocumentId,
    pub link_type: LinkType,
    pub weight: f64,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Serializable representation of the braid for persistence.
///
/// Links are stored exactly as held in memory, reverse links included, so
/// restoring a snapshot never synthesizes links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BraidSnapshot {
    pub version: String,
    pub documents: Vec<SnapshotDocument>,
    pub links: Vec<SnapshotLink>,
}

impl BraidSnapshot {
    /// Read a snapshot file.
    pub fn read(path: &Path) -> Result<Self, FabricaError> {
        read_json(path)
    }

    /// Atomically write the snapshot to a file.
    pub fn write(&self, path: &Path) -> Result<(), FabricaError> {
        write_json_atomic(path, self)
    }
}

impl From<&SemanticBraid> for BraidSnapshot {
    fn from(braid: &SemanticBraid) -> Self {
        let documents = braid
            .nodes
            .values()
            .map(|node| SnapshotDocument {
                id: node.id.clone(),
                path: node.path.clone(),
                title: node.title.clone(),
                doc_type: node.doc_type.clone(),
                metadata: node.metadata.clone(),
                tags: node.tags.clone(),
                embeddings: node.embeddings.clone(),
            })
            .collect();

        let links = braid
            .nodes
            .values()
            .flat_map(|node| node.links.iter())
            .map(|link| SnapshotLink {
                source: link.source.clone(),
                target: link.target.clone(),
                link_type: link.link_type.clone(),
                weight: link.weight,
                metadata: link.metadata.clone(),
            })
            .collect();

        Self {
            version: FORMAT_VERSION.to_string(),
            documents,
            links,
        }
    }
}

impl From<BraidSnapshot> for SemanticBraid {
    fn from(snapshot: BraidSnapshot) -> Self {
        let mut braid = SemanticBraid::new();

        for doc in snapshot.documents {
            let tags: BTreeSet<String> = doc.tags.iter().map(|t| t.to_lowercase()).collect();
            for tag in &tags {
                braid
                    .tag_index
                    .entry(tag.clone())
                    .or_default()
                    .insert(doc.id.clone());
            }
            let node = DocumentNode {
                id: doc.id.clone(),
                path: doc.path,
                title: doc.title,
                doc_type: doc.doc_type,
                metadata: doc.metadata,
                tags,
                embeddings: doc.embeddings,
                links: Vec::new(),
            };
            braid.nodes.insert(doc.id, node);
        }

        for link in snapshot.links {
            if !braid.nodes.contains_key(&link.target) {
                continue;
            }
            let link_type = link.link_type.clone();
            if let Some(node) = braid.nodes.get_mut(&link.source) {
                node.links.push(DocumentLink::new(
                    link.source,
                    link.target,
                    link.link_type,
                    link.weight,
                    link.metadata,
                ));
                braid.link_types.insert(link_type);
            }
        }

        braid
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => Metadata::new(),
        }
    }

    fn lt(label: &str) -> LinkType {
        LinkType::new(label).expect("valid link type")
    }

    fn braid_with(ids: &[&str]) -> SemanticBraid {
        let mut braid = SemanticBraid::new();
        for id in ids {
            braid.add_document(Some(DocumentId::new(*id)), &format!("docs/{}.md", id), Metadata::new());
        }
        braid
    }

    #[test]
    fn node_defaults_from_path() {
        let node = DocumentNode::new(None, "vault/notes/alpha.md", Metadata::new());

        assert_eq!(node.title(), "alpha");
        assert_eq!(node.doc_type(), "document");
        assert_eq!(
            node.id(),
            &DocumentId::derive("vault/notes/alpha.md", "alpha", "document")
        );
    }

    #[test]
    fn empty_id_is_derived() {
        let node = DocumentNode::new(Some(DocumentId::new("")), "a.md", Metadata::new());
        assert_eq!(node.id().as_str().len(), 64);
    }

    #[test]
    fn metadata_title_type_and_tags() {
        let node = DocumentNode::new(
            None,
            "a.md",
            meta(json!({"title": "Alpha", "type": "note", "tags": ["Physics", "MATH", 3]})),
        );

        assert_eq!(node.title(), "Alpha");
        assert_eq!(node.doc_type(), "note");
        assert_eq!(node.tags().collect::<Vec<_>>(), vec!["math", "physics"]);
        assert!(node.has_tag("PHYSICS"));
    }

    #[test]
    fn weight_is_clamped() {
        let mut braid = braid_with(&["a", "b"]);
        let (a, b) = (DocumentId::new("a"), DocumentId::new("b"));

        let high = braid.link(&a, &b, lt("cites"), 7.5, Metadata::new()).expect("link").weight();
        let low = braid.link(&a, &b, lt("cites"), -2.0, Metadata::new()).expect("link").weight();
        let nan = braid.link(&a, &b, lt("cites"), f64::NAN, Metadata::new()).expect("link").weight();

        assert_eq!(high, 1.0);
        assert_eq!(low, 0.0);
        assert_eq!(nan, 0.0);
    }

    #[test]
    fn link_to_missing_document_fails() {
        let mut braid = braid_with(&["a"]);
        let result = braid.link(
            &DocumentId::new("a"),
            &DocumentId::new("ghost"),
            lt("cites"),
            0.5,
            Metadata::new(),
        );

        assert!(matches!(result, Err(FabricaError::DocumentNotFound(id)) if id.as_str() == "ghost"));
        assert_eq!(braid.edge_count(), 0);
        assert_eq!(braid.link_types().count(), 0);
    }

    #[test]
    fn symmetric_link_creates_single_reverse() {
        let mut braid = braid_with(&["a", "b"]);
        let (a, b) = (DocumentId::new("a"), DocumentId::new("b"));

        braid
            .link(&a, &b, lt("similar_to"), 0.8, meta(json!({"k": "v"})))
            .expect("link");

        assert_eq!(braid.edge_count(), 2);
        let back: Vec<_> = braid.get_document(&b).expect("b").links(None).collect();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].target(), &a);
        assert_eq!(back[0].weight(), 0.8);
        assert_eq!(back[0].link_type().as_str(), "similar_to");
        assert_eq!(back[0].metadata().get("k"), Some(&json!("v")));
    }

    #[test]
    fn directional_link_has_no_reverse() {
        let mut braid = braid_with(&["a", "b"]);
        braid
            .link(&DocumentId::new("a"), &DocumentId::new("b"), lt("cites"), 0.5, Metadata::new())
            .expect("link");

        assert_eq!(braid.edge_count(), 1);
        assert_eq!(braid.get_document(&DocumentId::new("b")).expect("b").links(None).count(), 0);
    }

    #[test]
    fn find_related_sorts_and_filters() {
        let mut braid = braid_with(&["a", "b", "c", "d"]);
        let a = DocumentId::new("a");
        braid.link(&a, &DocumentId::new("b"), lt("cites"), 0.3, Metadata::new()).expect("link");
        braid.link(&a, &DocumentId::new("c"), lt("cites"), 0.9, Metadata::new()).expect("link");
        braid.link(&a, &DocumentId::new("d"), lt("mentions"), 0.3, Metadata::new()).expect("link");

        let all = braid.find_related(&a, None, 0.0).expect("related");
        let ids: Vec<_> = all.iter().map(|(n, _)| n.id().as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "d"]);

        let cites = lt("cites");
        let filtered = braid.find_related(&a, Some(&cites), 0.3).expect("related");
        assert_eq!(filtered.len(), 2);

        let strong = braid.find_related(&a, None, 0.9).expect("related");
        assert_eq!(strong.len(), 1);
    }

    #[test]
    fn find_related_unknown_document() {
        let braid = SemanticBraid::new();
        assert!(braid.find_related(&DocumentId::new("x"), None, 0.0).is_err());
    }

    #[test]
    fn shortest_path_self_and_missing() {
        let braid = braid_with(&["a"]);
        let a = DocumentId::new("a");

        let path = braid.shortest_path(&a, &a, 0).expect("self path");
        assert_eq!(path.len(), 1);
        assert!(braid.shortest_path(&a, &DocumentId::new("x"), 5).is_none());
    }

    #[test]
    fn shortest_path_respects_hop_budget() {
        let mut braid = braid_with(&["a", "b", "c", "d"]);
        for (s, t) in [("a", "b"), ("b", "c"), ("c", "d")] {
            braid
                .link(&DocumentId::new(s), &DocumentId::new(t), lt("next"), 1.0, Metadata::new())
                .expect("link");
        }
        let (a, d) = (DocumentId::new("a"), DocumentId::new("d"));

        let path = braid.shortest_path(&a, &d, 5).expect("path");
        let ids: Vec<_> = path.iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);

        assert!(braid.shortest_path(&a, &d, 1).is_none());
        assert!(braid.shortest_path(&a, &d, 2).is_some());
    }

    #[test]
    fn shortest_path_zero_hops_needs_direct_link() {
        let mut braid = braid_with(&["a", "b", "c"]);
        let (a, b, c) = (DocumentId::new("a"), DocumentId::new("b"), DocumentId::new("c"));
        braid.link(&a, &b, lt("next"), 1.0, Metadata::new()).expect("link");
        braid.link(&b, &c, lt("next"), 1.0, Metadata::new()).expect("link");

        assert!(braid.shortest_path(&a, &b, 0).is_some());
        assert!(braid.shortest_path(&a, &c, 0).is_none());
    }

    #[test]
    fn shortest_path_ignores_incoming_links() {
        let mut braid = braid_with(&["a", "b"]);
        braid
            .link(&DocumentId::new("b"), &DocumentId::new("a"), lt("cites"), 1.0, Metadata::new())
            .expect("link");

        assert!(braid.shortest_path(&DocumentId::new("a"), &DocumentId::new("b"), 5).is_none());
    }

    #[test]
    fn tag_lookup_is_case_insensitive() {
        let mut braid = SemanticBraid::new();
        braid.add_document(Some(DocumentId::new("a")), "a.md", meta(json!({"tags": ["Quantum"]})));
        braid.add_document(Some(DocumentId::new("b")), "b.md", meta(json!({"tags": "quantum"})));

        let ids: Vec<_> = braid.find_by_tag("QUANTUM").iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(braid.find_by_tag("missing").is_empty());
    }

    #[test]
    fn tags_added_later_are_indexed() {
        let mut braid = braid_with(&["a"]);
        let a = DocumentId::new("a");
        braid.tag_document(&a, "Late").expect("tag");

        assert_eq!(braid.find_by_tag("late").len(), 1);
        assert!(braid.get_document(&a).expect("a").has_tag("late"));
        assert!(braid.tag_document(&DocumentId::new("x"), "t").is_err());
    }

    #[test]
    fn replacing_document_drops_links_and_stale_tags() {
        let mut braid = SemanticBraid::new();
        let a = DocumentId::new("a");
        braid.add_document(Some(a.clone()), "a.md", meta(json!({"tags": ["old"]})));
        braid.add_document(Some(DocumentId::new("b")), "b.md", Metadata::new());
        braid.link(&a, &DocumentId::new("b"), lt("cites"), 1.0, Metadata::new()).expect("link");

        braid.add_document(Some(a.clone()), "a2.md", meta(json!({"tags": ["new"]})));

        assert_eq!(braid.node_count(), 2);
        assert_eq!(braid.get_document(&a).expect("a").links(None).count(), 0);
        assert!(braid.find_by_tag("old").is_empty());
        assert_eq!(braid.find_by_tag("new").len(), 1);
    }

    #[test]
    fn remove_document_prunes_incoming_links() {
        let mut braid = braid_with(&["a", "b", "c"]);
        let (a, b, c) = (DocumentId::new("a"), DocumentId::new("b"), DocumentId::new("c"));
        braid.link(&a, &b, lt("related_to"), 0.5, Metadata::new()).expect("link");
        braid.link(&c, &b, lt("cites"), 0.5, Metadata::new()).expect("link");
        braid.tag_document(&b, "gone").expect("tag");

        let removed = braid.remove_document(&b).expect("removed");

        assert_eq!(removed.id(), &b);
        assert_eq!(braid.edge_count(), 0);
        assert!(braid.find_by_tag("gone").is_empty());
        assert!(braid.remove_document(&b).is_none());
    }

    #[test]
    fn embeddings_are_stored_per_model() {
        let mut braid = braid_with(&["a"]);
        let a = DocumentId::new("a");
        braid.set_embedding(&a, "mini", vec![0.1, 0.2]).expect("embed");

        let node = braid.get_document(&a).expect("a");
        assert_eq!(node.embedding("mini"), Some(&[0.1f32, 0.2][..]));
        assert!(node.embedding("other").is_none());
    }

    #[test]
    fn connected_components_are_weak() {
        let mut braid = braid_with(&["a", "b", "c", "d", "e"]);
        braid.link(&DocumentId::new("b"), &DocumentId::new("a"), lt("cites"), 1.0, Metadata::new()).expect("link");
        braid.link(&DocumentId::new("d"), &DocumentId::new("c"), lt("cites"), 1.0, Metadata::new()).expect("link");

        let components = braid.connected_components();
        let rendered: Vec<Vec<&str>> = components
            .iter()
            .map(|c| c.iter().map(DocumentId::as_str).collect())
            .collect();

        assert_eq!(rendered, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
    }

    #[test]
    fn snapshot_roundtrip_preserves_structure() {
        let mut braid = SemanticBraid::new();
        let a = DocumentId::new("a");
        let b = DocumentId::new("b");
        braid.add_document(Some(a.clone()), "a.md", meta(json!({"tags": ["x"]})));
        braid.add_document(Some(b.clone()), "b.md", Metadata::new());
        braid.link(&a, &b, lt("similar_to"), 0.4, Metadata::new()).expect("link");
        braid.set_embedding(&a, "m", vec![1.0]).expect("embed");

        let snapshot = BraidSnapshot::from(&braid);
        let text = serde_json::to_string(&snapshot).expect("serialize");
        let parsed: BraidSnapshot = serde_json::from_str(&text).expect("parse");
        let restored = SemanticBraid::from(parsed);

        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 2);
        assert_eq!(restored.find_by_tag("x").len(), 1);
        assert_eq!(restored.link_types().count(), 1);
        assert_eq!(
            restored.get_document(&a).expect("a").embedding("m"),
            Some(&[1.0f32][..])
        );
    }

    #[test]
    fn hand_edited_snapshot_tags_are_normalized() {
        let id = DocumentId::new("a");
        let snapshot = BraidSnapshot {
            version: FORMAT_VERSION.to_string(),
            documents: vec![SnapshotDocument {
                id: id.clone(),
                path: "a.md".to_string(),
                title: "a".to_string(),
                doc_type: DEFAULT_DOCUMENT_TYPE.to_string(),
                metadata: Metadata::new(),
                tags: BTreeSet::from(["Physics".to_string(), "physics".to_string()]),
                embeddings: BTreeMap::new(),
            }],
            links: Vec::new(),
        };

        let restored = SemanticBraid::from(snapshot);

        assert_eq!(restored.find_by_tag("physics").len(), 1);
        assert_eq!(restored.find_by_tag("PHYSICS").len(), 1);
        let tags: Vec<&str> = restored.get_document(&id).expect("a").tags().collect();
        assert_eq!(tags, vec!["physics"]);
    }
}
