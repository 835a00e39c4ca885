//! Graph store seam
//!
//! The ingestion pipeline talks to the store only through these traits:
//! a shared [`GraphDriver`] hands out [`GraphSession`]s, and every session
//! is owned by exactly one task for its whole life (`run` takes `&mut self`).
//! Failures come back as [`StoreError`]s classified transient or fatal; only
//! transient ones are worth retrying.

pub mod memory;
pub mod statement;

pub use memory::{execute, MemoryDriver, MemorySession};
pub use statement::{NodeRow, RelationshipBatch, Row, Statement};

use async_trait::async_trait;
use crate::graph::GraphError;
use std::fmt;
use thiserror::Error;

/// Retry classification of a store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Safe to retry (lock contention, deadlock detection, leader switch)
    Transient,
    /// Retrying cannot help (constraint violation, lost connection, bad query)
    Fatal,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreErrorKind::Transient => f.write_str("transient"),
            StoreErrorKind::Fatal => f.write_str("fatal"),
        }
    }
}

/// Error reported by a graph store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} store error: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Fatal,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }
}

impl From<GraphError> for StoreError {
    fn from(err: GraphError) -> Self {
        StoreError::fatal(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to a graph store, used only to open sessions
#[async_trait]
pub trait GraphDriver: Send + Sync {
    async fn open_session(&self) -> StoreResult<Box<dyn GraphSession>>;
}

/// A single-owner connection to the store
#[async_trait]
pub trait GraphSession: Send {
    /// Run one statement and collect its rows
    async fn run(&mut self, statement: &Statement) -> StoreResult<Vec<Row>>;

    /// Release the session; further `run` calls fail
    async fn close(&mut self) -> StoreResult<()>;
}
