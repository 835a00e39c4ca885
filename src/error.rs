//! Ingestion errors
//!
//! One structured error type reaches the orchestrator. Its [`ErrorKind`]
//! lets callers branch on the failure class; [`IngestError::diagnostic`]
//! renders the whole cause chain for the log sink and completion notifier.

use crate::driver::StoreError;
use std::error::Error as _;
use std::path::PathBuf;
use thiserror::Error;

/// Failure class of an [`IngestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed collector document; never retried
    Parse,
    /// Input file could not be read
    Io,
    /// Transient store failure that outlived the retry budget
    TransientStore,
    /// Store failure that is not worth retrying
    FatalStore,
    /// A chunk task panicked or was torn down
    Worker,
    /// Rejected job configuration
    Config,
}

/// Errors raised by the ingestion pipeline
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to parse {}: {reason}", .path.display())]
    Parse {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context} failed after {attempts} attempts")]
    RetriesExhausted {
        context: String,
        statement: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("{context} failed")]
    Store {
        context: String,
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("Chunk {ordinal} worker failed: {reason}")]
    Worker { ordinal: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl IngestError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IngestError::Parse {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Parse { .. } => ErrorKind::Parse,
            IngestError::Io { .. } => ErrorKind::Io,
            IngestError::RetriesExhausted { .. } => ErrorKind::TransientStore,
            IngestError::Store { source, .. } if source.is_transient() => ErrorKind::TransientStore,
            IngestError::Store { .. } => ErrorKind::FatalStore,
            IngestError::Worker { .. } => ErrorKind::Worker,
            IngestError::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Cypher of the statement that failed, for store errors
    pub fn statement(&self) -> Option<&str> {
        match self {
            IngestError::RetriesExhausted { statement, .. } | IngestError::Store { statement, .. }
                if !statement.is_empty() =>
            {
                Some(statement)
            }
            _ => None,
        }
    }

    /// Human-readable rendering with every cause and the failing statement
    pub fn diagnostic(&self) -> String {
        let mut out = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            out.push_str("\n  caused by: ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        if let Some(statement) = self.statement() {
            out.push_str("\n  statement: ");
            out.push_str(statement);
        }
        out
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
