//! Directory node
//!
//! A node is one directory object (user, group, computer, ...). It always
//! carries the `Base` label plus its entity-type label, and is keyed on the
//! `objectid` property.

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId, OBJECT_ID_KEY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A node in the directory graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Store-assigned identifier
    pub id: NodeId,

    /// Labels, kept ordered so exports are stable
    pub labels: BTreeSet<Label>,

    /// Properties, including `objectid`
    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Node {
    /// Create a node keyed on `object_id` carrying the `Base` label
    pub fn new(id: NodeId, object_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let mut labels = BTreeSet::new();
        labels.insert(Label::base());
        let mut properties = PropertyMap::new();
        properties.insert(OBJECT_ID_KEY.to_string(), PropertyValue::String(object_id.into()));

        Node {
            id,
            labels,
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    /// The `objectid` this node is keyed on
    pub fn object_id(&self) -> &str {
        self.properties
            .get(OBJECT_ID_KEY)
            .and_then(PropertyValue::as_string)
            .unwrap_or_default()
    }

    /// Add a label; returns true if it was not present
    pub fn add_label(&mut self, label: impl Into<Label>) -> bool {
        let added = self.labels.insert(label.into());
        if added {
            self.touch();
        }
        added
    }

    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// Merge properties the way Cypher's `SET n += map` does
    ///
    /// The key property is never overwritten.
    pub fn merge_properties(&mut self, properties: &PropertyMap) {
        for (key, value) in properties {
            if key == OBJECT_ID_KEY {
                continue;
            }
            self.properties.insert(key.clone(), value.clone());
        }
        self.touch();
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}
