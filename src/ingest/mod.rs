//! Bulk ingestion pipeline
//!
//! Collector documents flow through two global phases:
//! 1. every document's records are merged as nodes, one file at a time
//! 2. every document is reloaded, partitioned into chunks, and each chunk's
//!    derived relationships are merged concurrently on its own session
//!
//! [`Ingestor`] sequences the phases; everything below it is either a pure
//! transform or a thin wrapper around a store session.

pub mod chunk;
pub mod document;
pub mod executor;
pub mod nodes;
pub mod orchestrator;
pub mod relationships;
pub mod retry;
pub mod schema;
pub mod sink;
pub mod stats;

pub use chunk::{partition, Chunk};
pub use document::{load_document, parse_document, CollectorDocument, EntityRecord, EntityType};
pub use executor::{process_document, ExecutionReport};
pub use nodes::materialize_nodes;
pub use orchestrator::{group_by_directory, Failure, IngestionJob, Ingestor, JobOutcome, JobState, Phase};
pub use relationships::{derive_batches, sync_laps};
pub use retry::run_with_retry;
pub use schema::{clear_store, prepare_schema, schema_statements};
pub use sink::{BufferSink, ChannelSink, CompletionNotifier, LogSink, LoggingNotifier, TracingSink};
pub use stats::{collect_summary, GraphSummary, StatsNotifier};
