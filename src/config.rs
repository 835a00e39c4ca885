//! Ingestion job configuration
//!
//! Passed explicitly to the orchestrator, the chunk executor and the retry
//! wrapper; nothing here is process-wide.

use crate::error::{IngestError, IngestResult};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of concurrent chunk workers per document
pub const DEFAULT_WORKERS: usize = 10;

/// Default number of attempts for a store operation
pub const DEFAULT_RETRIES: u32 = 15;

/// Default linear backoff step between attempts
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// What a per-file failure aborts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Any failure in either phase ends the job
    #[default]
    AbortJob,
    /// A node-phase failure skips the rest of its directory group only;
    /// a relationship-phase failure ends the job
    SkipGroup,
    /// A node-phase failure is recorded and every remaining file is still
    /// materialized; a relationship-phase failure ends the job
    ContinuePhase,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::AbortJob => "abort-job",
            FailurePolicy::SkipGroup => "skip-group",
            FailurePolicy::ContinuePhase => "continue-phase",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort-job" => Ok(FailurePolicy::AbortJob),
            "skip-group" => Ok(FailurePolicy::SkipGroup),
            "continue-phase" => Ok(FailurePolicy::ContinuePhase),
            other => Err(IngestError::InvalidConfig(format!("unknown failure policy '{}'", other))),
        }
    }
}

/// Tunables for one ingestion job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Upper bound on concurrent chunk workers (and chunks) per document
    pub worker_count: usize,
    /// Total attempts for one store operation before giving up
    pub retry_limit: u32,
    /// Also derive RDP, local admin, DCOM and PS-remote relationships
    pub legacy_mode: bool,
    pub failure_policy: FailurePolicy,
    /// Sleep before attempt `n + 1` is `backoff_step * n`
    pub backoff_step: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKERS,
            retry_limit: DEFAULT_RETRIES,
            legacy_mode: false,
            failure_policy: FailurePolicy::default(),
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl IngestConfig {
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_retries(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_legacy_mode(mut self, legacy_mode: bool) -> Self {
        self.legacy_mode = legacy_mode;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_backoff_step(mut self, backoff_step: Duration) -> Self {
        self.backoff_step = backoff_step;
        self
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> IngestResult<()> {
        if self.worker_count == 0 {
            return Err(IngestError::InvalidConfig("worker count must be at least 1".to_string()));
        }
        if self.retry_limit == 0 {
            return Err(IngestError::InvalidConfig("retry limit must be at least 1".to_string()));
        }
        Ok(())
    }
}
