//! Uniqueness constraints and property lookup indexes
//!
//! Both are registered by name with `IF NOT EXISTS` semantics. Indexes start
//! out `Populating` and only serve lookups once `await_indexes` has brought
//! them `Online`.

use super::property::PropertyValue;
use super::types::{Label, NodeId};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// A uniqueness constraint on `(label, property)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: String,
    pub label: Label,
    pub property: String,
}

/// Build state of a lookup index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Populating,
    Online,
}

/// A lookup index on `(label, property)`
#[derive(Debug, Clone)]
pub struct PropertyIndex {
    pub name: String,
    pub label: Label,
    pub property: String,
    pub state: IndexState,
    entries: HashMap<String, BTreeSet<NodeId>>,
}

impl PropertyIndex {
    fn new(name: String, label: Label, property: String) -> Self {
        Self {
            name,
            label,
            property,
            state: IndexState::Populating,
            entries: HashMap::new(),
        }
    }

    fn insert(&mut self, value: &PropertyValue, node_id: NodeId) {
        if let Some(key) = value.index_key() {
            self.entries.entry(key).or_default().insert(node_id);
        }
    }

    fn remove(&mut self, value: &PropertyValue, node_id: NodeId) {
        if let Some(key) = value.index_key() {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(&node_id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }
}

/// Registry of every constraint and index defined on the store
#[derive(Debug, Default)]
pub struct SchemaCatalog {
    constraints: IndexMap<String, UniqueConstraint>,
    indexes: IndexMap<String, PropertyIndex>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constraint; returns false if the name already exists
    pub fn add_constraint(&mut self, name: &str, label: Label, property: &str) -> bool {
        if self.constraints.contains_key(name) {
            return false;
        }
        self.constraints.insert(
            name.to_string(),
            UniqueConstraint {
                name: name.to_string(),
                label,
                property: property.to_string(),
            },
        );
        true
    }

    /// Register an index; returns false if the name already exists
    pub fn add_index(&mut self, name: &str, label: Label, property: &str) -> bool {
        if self.indexes.contains_key(name) {
            return false;
        }
        self.indexes.insert(
            name.to_string(),
            PropertyIndex::new(name.to_string(), label, property.to_string()),
        );
        true
    }

    pub fn drop_constraint(&mut self, name: &str) -> bool {
        self.constraints.shift_remove(name).is_some()
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.shift_remove(name).is_some()
    }

    /// Bring every populating index online, returning how many changed state
    pub fn await_indexes(&mut self) -> usize {
        let mut promoted = 0;
        for index in self.indexes.values_mut() {
            if index.state == IndexState::Populating {
                index.state = IndexState::Online;
                promoted += 1;
            }
        }
        promoted
    }

    pub fn constraint(&self, name: &str) -> Option<&UniqueConstraint> {
        self.constraints.get(name)
    }

    pub fn index(&self, name: &str) -> Option<&PropertyIndex> {
        self.indexes.get(name)
    }

    pub fn constraints(&self) -> impl Iterator<Item = &UniqueConstraint> {
        self.constraints.values()
    }

    pub fn indexes(&self) -> impl Iterator<Item = &PropertyIndex> {
        self.indexes.values()
    }

    /// Constraints that apply to a node carrying `label`
    pub fn constraints_on<'a>(&'a self, label: &'a Label) -> impl Iterator<Item = &'a UniqueConstraint> + 'a {
        self.constraints.values().filter(move |c| &c.label == label)
    }

    /// Record `value` for every index covering `(label, property)`
    pub fn index_insert(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) {
        for index in self.indexes.values_mut() {
            if &index.label == label && index.property == property {
                index.insert(value, node_id);
            }
        }
    }

    /// Forget `value` for every index covering `(label, property)`
    pub fn index_remove(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) {
        for index in self.indexes.values_mut() {
            if &index.label == label && index.property == property {
                index.remove(value, node_id);
            }
        }
    }

    /// Look a value up through an online index
    ///
    /// Returns `None` when no online index covers `(label, property)`.
    pub fn lookup(&self, label: &Label, property: &str, value: &PropertyValue) -> Option<Vec<NodeId>> {
        let index = self.indexes.values().find(|i| {
            &i.label == label && i.property == property && i.state == IndexState::Online
        })?;
        let key = value.index_key()?;
        Some(
            index
                .entries
                .get(&key)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
        )
    }

    pub fn clear_index_entries(&mut self) {
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }
}
