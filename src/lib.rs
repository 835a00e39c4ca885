//! Dirgraph
//!
//! Bulk ingestion of directory reconnaissance dumps (users, groups,
//! computers, OUs, GPOs, domains and their access-control and delegation
//! relationships) into a property graph.
//!
//! # Architecture
//!
//! - [`graph`]: in-memory property graph keyed on `objectid`, with
//!   uniqueness constraints and name indexes
//! - [`driver`]: the store seam; drivers hand out single-owner sessions that
//!   run typed [`Statement`](driver::Statement)s and classify failures as
//!   transient or fatal
//! - [`ingest`]: the two-phase pipeline (node materialization, then chunked
//!   concurrent relationship derivation) and its orchestrator
//! - [`config`], [`error`]: job configuration and the structured error type
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dirgraph::driver::MemoryDriver;
//! use dirgraph::ingest::{Ingestor, IngestionJob, LoggingNotifier, TracingSink};
//! use dirgraph::IngestConfig;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let driver = Arc::new(MemoryDriver::new());
//! let ingestor = Ingestor::new(driver.clone(), Arc::new(TracingSink), Arc::new(LoggingNotifier));
//!
//! let job = IngestionJob::new(["dump/users.json", "dump/groups.json"], IngestConfig::default());
//! let outcome = ingestor.run(job).await;
//! assert!(outcome.succeeded());
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod graph;
pub mod ingest;

// Re-export main types for convenience
pub use config::{FailurePolicy, IngestConfig};
pub use driver::{GraphDriver, GraphSession, MemoryDriver, Statement, StoreError, StoreErrorKind};
pub use error::{ErrorKind, IngestError, IngestResult};
pub use graph::{EdgeType, GraphError, GraphResult, GraphStore, Label, Node, NodeId, PropertyMap, PropertyValue};
pub use ingest::{IngestionJob, Ingestor, JobOutcome, JobState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
