//! In-memory directory graph storage
//!
//! Nodes are keyed on their `objectid`; every write is a merge, so applying
//! the same node rows or relationship pairs twice leaves the graph unchanged.

use super::edge::Edge;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use super::schema::SchemaCatalog;
use super::types::{EdgeId, EdgeType, Label, NodeId, OBJECT_ID_KEY};
use rustc_hash::FxHashSet;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors that can occur during graph operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Constraint {constraint} violated: a {label} node with {property} = {value} already exists")]
    ConstraintViolation {
        constraint: String,
        label: Label,
        property: String,
        value: String,
    },

    #[error("Relationship type must not be empty")]
    EmptyEdgeType,

    #[error("Node key must not be empty")]
    EmptyObjectId,
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Result of merging a single relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMerge {
    Created(EdgeId),
    Existing(EdgeId),
    /// One endpoint is absent or lacks the required label; nothing written
    MissingEndpoint,
}

/// Relationship as exported, endpoints referenced by `objectid`
#[derive(Debug, Clone, Serialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

/// Serializable copy of the whole graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<EdgeRecord>,
}

/// In-memory graph storage
///
/// - nodes / edges: arenas indexed by id
/// - outgoing / incoming: adjacency lists per node
/// - key_index: objectid -> NodeId
/// - label_index / edge_type_index: fast label and type scans
/// - edge_keys: (source, target, type) set backing relationship merges
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    key_index: HashMap<String, NodeId>,
    label_index: HashMap<Label, BTreeSet<NodeId>>,
    edge_type_index: HashMap<EdgeType, Vec<EdgeId>>,
    edge_keys: FxHashSet<(NodeId, NodeId, EdgeType)>,
    schema: SchemaCatalog,
}

impl GraphStore {
    /// Create a new empty graph store
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a node keyed on `object_id`: create it if absent, add `labels`
    /// and overlay `properties`. Returns the node id and whether it was new.
    pub fn merge_node(
        &mut self,
        object_id: &str,
        labels: &[Label],
        properties: &PropertyMap,
    ) -> GraphResult<(NodeId, bool)> {
        if object_id.is_empty() {
            return Err(GraphError::EmptyObjectId);
        }
        let existing = self.key_index.get(object_id).copied();
        self.check_constraints(existing, labels, properties)?;

        let (node_id, created) = match existing {
            Some(id) => (id, false),
            None => {
                let id = NodeId::new(self.nodes.len() as u64);
                self.nodes.push(Node::new(id, object_id));
                self.outgoing.push(Vec::new());
                self.incoming.push(Vec::new());
                self.key_index.insert(object_id.to_string(), id);
                (id, true)
            }
        };

        // Unindex the values about to be replaced
        {
            let node = &self.nodes[node_id.index()];
            for label in &node.labels {
                for key in properties.keys() {
                    if let Some(old) = node.properties.get(key) {
                        self.schema.index_remove(label, key, old, node_id);
                    }
                }
            }
        }

        let node = &mut self.nodes[node_id.index()];
        for label in std::iter::once(Label::base()).chain(labels.iter().cloned()) {
            if node.add_label(label.clone()) || created {
                self.label_index.entry(label).or_default().insert(node_id);
            }
        }
        node.merge_properties(properties);

        let node = &self.nodes[node_id.index()];
        for label in &node.labels {
            for (key, value) in &node.properties {
                self.schema.index_insert(label, key, value, node_id);
            }
        }

        Ok((node_id, created))
    }

    fn check_constraints(
        &self,
        existing: Option<NodeId>,
        labels: &[Label],
        properties: &PropertyMap,
    ) -> GraphResult<()> {
        let mut all_labels: BTreeSet<Label> = labels.iter().cloned().collect();
        all_labels.insert(Label::base());
        if let Some(id) = existing {
            all_labels.extend(self.nodes[id.index()].labels.iter().cloned());
        }

        for label in &all_labels {
            for constraint in self.schema.constraints_on(label) {
                // objectid uniqueness is structural: the key index never holds duplicates
                if constraint.property == OBJECT_ID_KEY {
                    continue;
                }
                let value = properties
                    .get(&constraint.property)
                    .or_else(|| existing.and_then(|id| self.nodes[id.index()].get_property(&constraint.property)));
                let Some(value) = value.filter(|v| !v.is_null()) else {
                    continue;
                };
                let clash = self
                    .nodes_with_label(label)
                    .any(|n| Some(n.id) != existing && n.get_property(&constraint.property) == Some(value));
                if clash {
                    return Err(GraphError::ConstraintViolation {
                        constraint: constraint.name.clone(),
                        label: label.clone(),
                        property: constraint.property.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Merge a relationship between two existing nodes
    ///
    /// Endpoints are matched on `objectid` and, when given, on a label. A
    /// missing endpoint is not an error: the pair is skipped.
    pub fn merge_edge(
        &mut self,
        source_key: &str,
        target_key: &str,
        edge_type: &EdgeType,
        source_label: Option<&Label>,
        target_label: Option<&Label>,
    ) -> GraphResult<EdgeMerge> {
        if edge_type.as_str().is_empty() {
            return Err(GraphError::EmptyEdgeType);
        }
        let (Some(source), Some(target)) = (
            self.match_node(source_key, source_label),
            self.match_node(target_key, target_label),
        ) else {
            return Ok(EdgeMerge::MissingEndpoint);
        };

        let key = (source, target, edge_type.clone());
        if self.edge_keys.contains(&key) {
            let id = self.outgoing[source.index()]
                .iter()
                .copied()
                .find(|id| {
                    let edge = &self.edges[id.index()];
                    edge.target == target && &edge.edge_type == edge_type
                })
                .ok_or(GraphError::NodeNotFound(target))?;
            return Ok(EdgeMerge::Existing(id));
        }

        let edge_id = EdgeId::new(self.edges.len() as u64);
        self.edges.push(Edge::new(edge_id, source, target, edge_type.clone()));
        self.outgoing[source.index()].push(edge_id);
        self.incoming[target.index()].push(edge_id);
        self.edge_type_index
            .entry(edge_type.clone())
            .or_default()
            .push(edge_id);
        self.edge_keys.insert(key);
        Ok(EdgeMerge::Created(edge_id))
    }

    fn match_node(&self, object_id: &str, label: Option<&Label>) -> Option<NodeId> {
        let id = *self.key_index.get(object_id)?;
        match label {
            Some(label) if !self.nodes[id.index()].has_label(label) => None,
            _ => Some(id),
        }
    }

    /// Register a uniqueness constraint, validating existing data first
    pub fn create_constraint(&mut self, name: &str, label: Label, property: &str) -> GraphResult<bool> {
        if self.schema.constraint(name).is_some() {
            return Ok(false);
        }
        if property != OBJECT_ID_KEY {
            let mut seen: Vec<&PropertyValue> = Vec::new();
            for node in self.nodes_with_label(&label) {
                if let Some(value) = node.get_property(property).filter(|v| !v.is_null()) {
                    if seen.contains(&value) {
                        return Err(GraphError::ConstraintViolation {
                            constraint: name.to_string(),
                            label: label.clone(),
                            property: property.to_string(),
                            value: value.to_string(),
                        });
                    }
                    seen.push(value);
                }
            }
        }
        Ok(self.schema.add_constraint(name, label, property))
    }

    /// Register a lookup index and backfill it from existing nodes
    pub fn create_index(&mut self, name: &str, label: Label, property: &str) -> bool {
        if !self.schema.add_index(name, label.clone(), property) {
            return false;
        }
        let ids: Vec<NodeId> = self
            .label_index
            .get(&label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for id in ids {
            if let Some(value) = self.nodes[id.index()].get_property(property).cloned() {
                self.schema.index_insert(&label, property, &value, id);
            }
        }
        true
    }

    /// Bring every index online
    pub fn await_indexes(&mut self) -> usize {
        self.schema.await_indexes()
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.schema.drop_index(name)
    }

    pub fn drop_constraint(&mut self, name: &str) -> bool {
        self.schema.drop_constraint(name)
    }

    pub fn schema(&self) -> &SchemaCatalog {
        &self.schema
    }

    /// Get a node by ID
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a node by its `objectid`
    pub fn find_node(&self, object_id: &str) -> Option<&Node> {
        self.key_index.get(object_id).and_then(|&id| self.get_node(id))
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    /// Check for a relationship between two keyed nodes
    pub fn has_edge(&self, source_key: &str, edge_type: &str, target_key: &str) -> bool {
        match (self.key_index.get(source_key), self.key_index.get(target_key)) {
            (Some(&s), Some(&t)) => self.edge_keys.contains(&(s, t, EdgeType::new(edge_type))),
            _ => false,
        }
    }

    /// Nodes with `label` whose `property` equals `value`
    ///
    /// Served from an online index when one covers the pair, by label scan
    /// otherwise.
    pub fn find_by_property(&self, label: &Label, property: &str, value: &PropertyValue) -> Vec<&Node> {
        if let Some(ids) = self.schema.lookup(label, property, value) {
            return ids.into_iter().filter_map(|id| self.get_node(id)).collect();
        }
        self.nodes_with_label(label)
            .filter(|n| n.get_property(property) == Some(value))
            .collect()
    }

    pub fn get_outgoing_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.outgoing
            .get(node_id.index())
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_incoming_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.incoming
            .get(node_id.index())
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    fn nodes_with_label<'a>(&'a self, label: &Label) -> impl Iterator<Item = &'a Node> + 'a {
        self.label_index
            .get(label)
            .into_iter()
            .flatten()
            .filter_map(|&id| self.nodes.get(id.index()))
    }

    /// Get all edges of a specific type
    pub fn get_edges_by_type(&self, edge_type: &EdgeType) -> Vec<&Edge> {
        self.edge_type_index
            .get(edge_type)
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Relationship types present in the graph, sorted
    pub fn edge_types(&self) -> Vec<EdgeType> {
        let mut types: Vec<EdgeType> = self
            .edge_type_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(t, _)| t.clone())
            .collect();
        types.sort();
        types
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn label_count(&self, label: &Label) -> usize {
        self.label_index.get(label).map_or(0, BTreeSet::len)
    }

    pub fn edge_type_count(&self, edge_type: &EdgeType) -> usize {
        self.edge_type_index.get(edge_type).map_or(0, Vec::len)
    }

    /// Delete every node and relationship, keeping the schema definitions
    pub fn detach_delete_all(&mut self) -> usize {
        let removed = self.nodes.len();
        self.nodes.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.key_index.clear();
        self.label_index.clear();
        self.edge_type_index.clear();
        self.edge_keys.clear();
        self.schema.clear_index_entries();
        removed
    }

    /// Copy the graph out for export
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.clone(),
            edges: self
                .edges
                .iter()
                .map(|e| EdgeRecord {
                    source: self.nodes[e.source.index()].object_id().to_string(),
                    target: self.nodes[e.target.index()].object_id().to_string(),
                    edge_type: e.edge_type.clone(),
                })
                .collect(),
        }
    }
}
