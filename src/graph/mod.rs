//! In-memory directory graph
//!
//! A property graph specialised for directory objects:
//! - Nodes keyed on `objectid`, carrying `Base` plus an entity-type label
//! - Directed, typed relationships with at most one edge per (source, type, target)
//! - Uniqueness constraints and name lookup indexes registered by name

pub mod edge;
pub mod node;
pub mod property;
pub mod schema;
pub mod store;
pub mod types;

pub use edge::Edge;
pub use node::Node;
pub use property::{PropertyMap, PropertyValue};
pub use schema::{IndexState, PropertyIndex, SchemaCatalog, UniqueConstraint};
pub use store::{EdgeMerge, EdgeRecord, GraphError, GraphResult, GraphSnapshot, GraphStore};
pub use types::{quote_identifier, EdgeId, EdgeType, Label, NodeId, NAME_KEY, OBJECT_ID_KEY};
