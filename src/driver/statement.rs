//! Typed statements sent to a graph session
//!
//! Each statement renders to the Cypher a Bolt-speaking store would run;
//! the in-memory driver interprets the typed form directly.

use crate::graph::{quote_identifier, EdgeType, Label, PropertyMap, PropertyValue, OBJECT_ID_KEY};
use indexmap::IndexMap;

/// One node to merge: its key plus the properties to overlay
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub object_id: String,
    pub properties: PropertyMap,
}

/// A bulk relationship write: one type, many `(source, target)` pairs
///
/// Endpoints are matched on `objectid`; the optional labels narrow the
/// match (e.g. a primary group must be a `Group`).
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipBatch {
    pub edge_type: EdgeType,
    pub source_label: Option<Label>,
    pub target_label: Option<Label>,
    pub pairs: Vec<(String, String)>,
}

impl RelationshipBatch {
    pub fn new(edge_type: impl Into<EdgeType>) -> Self {
        Self {
            edge_type: edge_type.into(),
            source_label: None,
            target_label: None,
            pairs: Vec::new(),
        }
    }

    pub fn with_source_label(mut self, label: impl Into<Label>) -> Self {
        self.source_label = Some(label.into());
        self
    }

    pub fn with_target_label(mut self, label: impl Into<Label>) -> Self {
        self.target_label = Some(label.into());
        self
    }

    pub fn push(&mut self, source: impl Into<String>, target: impl Into<String>) {
        self.pairs.push((source.into(), target.into()));
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A unit of work for a [`GraphSession`](super::GraphSession)
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateConstraint { name: String, label: Label, property: String },
    CreateIndex { name: String, label: Label, property: String },
    /// Block until every index is online
    AwaitIndexes,
    DropConstraint { name: String },
    DropIndex { name: String },
    MergeNodes { label: Label, rows: Vec<NodeRow> },
    MergeRelationships(RelationshipBatch),
    /// `objectid` of every `label` node whose boolean `property` is true
    MatchFlagged { label: Label, property: String },
    RelationshipTypes,
    /// Relationship count, optionally restricted to some types
    CountRelationships { types: Option<Vec<EdgeType>> },
    CountNodes { label: Label },
    DetachDeleteAll,
}

impl Statement {
    /// Statements that never modify the graph
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Statement::MatchFlagged { .. }
                | Statement::RelationshipTypes
                | Statement::CountRelationships { .. }
                | Statement::CountNodes { .. }
        )
    }

    /// Short description used as error context
    pub fn summary(&self) -> String {
        match self {
            Statement::CreateConstraint { name, .. } => format!("create constraint {}", name),
            Statement::CreateIndex { name, .. } => format!("create index {}", name),
            Statement::AwaitIndexes => "await indexes".to_string(),
            Statement::DropConstraint { name } => format!("drop constraint {}", name),
            Statement::DropIndex { name } => format!("drop index {}", name),
            Statement::MergeNodes { label, rows } => format!("merge {} {} nodes", rows.len(), label),
            Statement::MergeRelationships(batch) => {
                format!("merge {} {} relationships", batch.len(), batch.edge_type)
            }
            Statement::MatchFlagged { label, property } => {
                format!("match {} nodes with {} = true", label, property)
            }
            Statement::RelationshipTypes => "list relationship types".to_string(),
            Statement::CountRelationships { .. } => "count relationships".to_string(),
            Statement::CountNodes { label } => format!("count {} nodes", label),
            Statement::DetachDeleteAll => "delete all nodes".to_string(),
        }
    }

    /// Cypher text for this statement, parameters left symbolic
    pub fn cypher(&self) -> String {
        match self {
            Statement::CreateConstraint { name, label, property } => format!(
                "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
                quote_identifier(name),
                quote_identifier(label.as_str()),
                quote_identifier(property)
            ),
            Statement::CreateIndex { name, label, property } => format!(
                "CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{})",
                quote_identifier(name),
                quote_identifier(label.as_str()),
                quote_identifier(property)
            ),
            Statement::AwaitIndexes => "CALL db.awaitIndexes()".to_string(),
            Statement::DropConstraint { name } => {
                format!("DROP CONSTRAINT {} IF EXISTS", quote_identifier(name))
            }
            Statement::DropIndex { name } => format!("DROP INDEX {} IF EXISTS", quote_identifier(name)),
            Statement::MergeNodes { label, .. } => format!(
                "UNWIND $rows AS row MERGE (n:{}:{} {{{}: row.ObjectIdentifier}}) SET n += row.Properties",
                quote_identifier(label.as_str()),
                Label::BASE,
                OBJECT_ID_KEY
            ),
            Statement::MergeRelationships(batch) => format!(
                "UNWIND $pairs AS pair \
                 MATCH (src:{} {{{key}: pair.source}}) \
                 MATCH (dst:{} {{{key}: pair.target}}) \
                 MERGE (src)-[:{}]->(dst)",
                endpoint_label(batch.source_label.as_ref()),
                endpoint_label(batch.target_label.as_ref()),
                batch.edge_type.quoted(),
                key = OBJECT_ID_KEY
            ),
            Statement::MatchFlagged { label, property } => format!(
                "MATCH (n:{}) WHERE n.{} = true RETURN n.{key} AS {key}",
                quote_identifier(label.as_str()),
                quote_identifier(property),
                key = OBJECT_ID_KEY
            ),
            Statement::RelationshipTypes => "CALL db.relationshipTypes()".to_string(),
            Statement::CountRelationships { types: None } => {
                "MATCH ()-[r]->() RETURN count(r) AS count".to_string()
            }
            Statement::CountRelationships { types: Some(types) } => {
                let list: Vec<String> = types
                    .iter()
                    .map(|t| format!("'{}'", t.as_str().replace('\'', "\\'")))
                    .collect();
                format!(
                    "MATCH ()-[r]->() WHERE type(r) IN [{}] RETURN count(r) AS count",
                    list.join(", ")
                )
            }
            Statement::CountNodes { label } => format!(
                "MATCH (n:{}) RETURN count(n) AS count",
                quote_identifier(label.as_str())
            ),
            Statement::DetachDeleteAll => "MATCH (n) DETACH DELETE n".to_string(),
        }
    }
}

fn endpoint_label(label: Option<&Label>) -> String {
    quote_identifier(label.map_or(Label::BASE, Label::as_str))
}

/// One result row, columns in query order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(IndexMap<String, PropertyValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&PropertyValue> {
        self.0.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(PropertyValue::as_string)
    }

    pub fn get_integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(PropertyValue::as_integer)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
