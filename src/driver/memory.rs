//! In-process driver backed by [`GraphStore`]
//!
//! Sessions share one store behind a `tokio::sync::RwLock`; read-only
//! statements take the read lock, everything else the write lock.

use super::statement::{Row, Statement};
use super::{GraphDriver, GraphSession, StoreError, StoreResult};
use crate::graph::{EdgeMerge, GraphResult, GraphStore, PropertyValue, OBJECT_ID_KEY};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Driver over a shared in-memory graph
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    store: Arc<RwLock<GraphStore>>,
}

impl MemoryDriver {
    /// Create a driver over a fresh empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Arc<RwLock<GraphStore>> {
        &self.store
    }
}

#[async_trait]
impl GraphDriver for MemoryDriver {
    async fn open_session(&self) -> StoreResult<Box<dyn GraphSession>> {
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
            open: true,
        }))
    }
}

/// Session over a [`MemoryDriver`]'s store
#[derive(Debug)]
pub struct MemorySession {
    store: Arc<RwLock<GraphStore>>,
    open: bool,
}

#[async_trait]
impl GraphSession for MemorySession {
    async fn run(&mut self, statement: &Statement) -> StoreResult<Vec<Row>> {
        if !self.open {
            return Err(StoreError::fatal("session is closed"));
        }
        debug!(cypher = %statement.cypher(), "running statement");
        if statement.is_read_only() {
            let store = self.store.read().await;
            Ok(query(&store, statement))
        } else {
            let mut store = self.store.write().await;
            Ok(execute(&mut store, statement)?)
        }
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.open = false;
        Ok(())
    }
}

/// Apply a statement to a store
pub fn execute(store: &mut GraphStore, statement: &Statement) -> GraphResult<Vec<Row>> {
    let rows = match statement {
        Statement::CreateConstraint { name, label, property } => {
            store.create_constraint(name, label.clone(), property)?;
            Vec::new()
        }
        Statement::CreateIndex { name, label, property } => {
            store.create_index(name, label.clone(), property);
            Vec::new()
        }
        Statement::AwaitIndexes => {
            store.await_indexes();
            Vec::new()
        }
        Statement::DropConstraint { name } => {
            store.drop_constraint(name);
            Vec::new()
        }
        Statement::DropIndex { name } => {
            store.drop_index(name);
            Vec::new()
        }
        Statement::MergeNodes { label, rows } => {
            let labels = [label.clone()];
            let mut created = 0i64;
            for row in rows {
                let (_, is_new) = store.merge_node(&row.object_id, &labels, &row.properties)?;
                created += i64::from(is_new);
            }
            vec![Row::new()
                .with("created", created)
                .with("merged", rows.len() as i64)]
        }
        Statement::MergeRelationships(batch) => {
            let (mut created, mut existing, mut skipped) = (0i64, 0i64, 0i64);
            for (source, target) in &batch.pairs {
                match store.merge_edge(
                    source,
                    target,
                    &batch.edge_type,
                    batch.source_label.as_ref(),
                    batch.target_label.as_ref(),
                )? {
                    EdgeMerge::Created(_) => created += 1,
                    EdgeMerge::Existing(_) => existing += 1,
                    EdgeMerge::MissingEndpoint => skipped += 1,
                }
            }
            vec![Row::new()
                .with("created", created)
                .with("existing", existing)
                .with("skipped", skipped)]
        }
        Statement::DetachDeleteAll => {
            let deleted = store.detach_delete_all();
            vec![Row::new().with("deleted", deleted as i64)]
        }
        read => query(store, read),
    };
    Ok(rows)
}

fn query(store: &GraphStore, statement: &Statement) -> Vec<Row> {
    match statement {
        Statement::MatchFlagged { label, property } => store
            .find_by_property(label, property, &PropertyValue::Boolean(true))
            .into_iter()
            .map(|node| Row::new().with(OBJECT_ID_KEY, node.object_id()))
            .collect(),
        Statement::RelationshipTypes => store
            .edge_types()
            .into_iter()
            .map(|t| Row::new().with("relationshipType", t.as_str()))
            .collect(),
        Statement::CountRelationships { types } => {
            let count = match types {
                None => store.edge_count(),
                Some(types) => types.iter().map(|t| store.edge_type_count(t)).sum(),
            };
            vec![Row::new().with("count", count as i64)]
        }
        Statement::CountNodes { label } => {
            vec![Row::new().with("count", store.label_count(label) as i64)]
        }
        _ => Vec::new(),
    }
}
