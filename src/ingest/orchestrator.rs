//! Ingestion job orchestration
//!
//! Drives one job through `PreparingSchema -> MaterializingNodes ->
//! DerivingRelationships` and decides, per [`FailurePolicy`], how far a
//! file failure reaches. Node materialization for every file finishes
//! before relationship derivation starts for any file, and any node-phase
//! failure suppresses the relationship phase entirely.

use super::document::{display_name, load_document};
use super::executor::process_document;
use super::nodes::materialize_nodes;
use super::schema::{close_session, open_session, prepare_schema};
use super::sink::{CompletionNotifier, LogSink};
use crate::config::{FailurePolicy, IngestConfig};
use crate::driver::GraphDriver;
use crate::error::{ErrorKind, IngestError, IngestResult};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle of an ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    PreparingSchema,
    MaterializingNodes,
    DerivingRelationships,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::PreparingSchema => "preparing schema",
            JobState::MaterializingNodes => "materializing nodes",
            JobState::DerivingRelationships => "deriving relationships",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stage a failure was recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuration,
    Schema,
    Nodes,
    Relationships,
}

/// One ingestion request
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub files: Vec<PathBuf>,
    pub config: IngestConfig,
}

impl IngestionJob {
    pub fn new<P: Into<PathBuf>>(files: impl IntoIterator<Item = P>, config: IngestConfig) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            config,
        }
    }
}

/// A recorded failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub phase: Phase,
    /// File being processed, if the failure belongs to one
    pub path: Option<PathBuf>,
    pub kind: ErrorKind,
    pub diagnostic: String,
}

/// Final state of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub state: JobState,
    /// Number of input files
    pub files: usize,
    /// Files whose nodes were merged
    pub materialized: usize,
    /// Files whose relationships were merged
    pub derived: usize,
    pub failures: Vec<Failure>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Diagnostic of the last recorded failure
    pub fn diagnostic(&self) -> Option<&str> {
        self.failures.last().map(|f| f.diagnostic.as_str())
    }

    pub fn last_failure(&self) -> Option<&Failure> {
        self.failures.last()
    }
}

/// Group files by containing directory, keeping first-seen order
pub fn group_by_directory(files: &[PathBuf]) -> IndexMap<PathBuf, Vec<PathBuf>> {
    let mut groups: IndexMap<PathBuf, Vec<PathBuf>> = IndexMap::new();
    for file in files {
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        groups.entry(dir).or_default().push(file.clone());
    }
    groups
}

/// Mutable state of one running job
struct JobRun {
    state: JobState,
    outcome: JobOutcome,
}

impl JobRun {
    fn new(files: usize) -> Self {
        Self {
            state: JobState::Idle,
            outcome: JobOutcome {
                state: JobState::Idle,
                files,
                materialized: 0,
                derived: 0,
                failures: Vec::new(),
            },
        }
    }

    fn enter(&mut self, next: JobState) {
        debug!(from = %self.state, to = %next, "job state");
        self.state = next;
    }

    fn record(&mut self, phase: Phase, path: Option<&Path>, err: &IngestError) {
        match path {
            Some(path) => error!(file = %path.display(), kind = ?err.kind(), "{}", err),
            None => error!(kind = ?err.kind(), "{}", err),
        }
        self.outcome.failures.push(Failure {
            phase,
            path: path.map(Path::to_path_buf),
            kind: err.kind(),
            diagnostic: err.diagnostic(),
        });
    }

    fn failed(&self) -> bool {
        !self.outcome.failures.is_empty()
    }

    fn finish(mut self) -> JobOutcome {
        let last = if self.failed() { JobState::Failed } else { JobState::Completed };
        self.enter(last);
        self.outcome.state = last;
        self.outcome
    }
}

/// Runs ingestion jobs against one graph store
pub struct Ingestor {
    driver: Arc<dyn GraphDriver>,
    log: Arc<dyn LogSink>,
    notifier: Arc<dyn CompletionNotifier>,
}

impl Ingestor {
    pub fn new(driver: Arc<dyn GraphDriver>, log: Arc<dyn LogSink>, notifier: Arc<dyn CompletionNotifier>) -> Self {
        Self { driver, log, notifier }
    }

    pub fn driver(&self) -> &Arc<dyn GraphDriver> {
        &self.driver
    }

    fn report(&self, line: impl AsRef<str>) {
        self.log.report(line.as_ref());
    }

    /// Run `job` to completion
    ///
    /// Failures are reported through the log sink and the returned outcome;
    /// the completion notifier is told once and then asked to refresh its
    /// statistics.
    pub async fn run(&self, job: IngestionJob) -> JobOutcome {
        let mut run = JobRun::new(job.files.len());
        info!(files = job.files.len(), workers = job.config.worker_count, policy = %job.config.failure_policy, "ingestion started");

        if let Err(err) = job.config.validate() {
            run.record(Phase::Configuration, None, &err);
        } else {
            self.run_phases(&job, &mut run).await;
        }

        let outcome = run.finish();
        self.report(if outcome.succeeded() { "=== COMPLETED ===" } else { "=== ERROR ===" });
        info!(state = %outcome.state, failures = outcome.failures.len(), "ingestion finished");

        self.notifier.job_finished(&outcome);
        self.notifier.refresh_statistics().await;
        outcome
    }

    async fn run_phases(&self, job: &IngestionJob, run: &mut JobRun) {
        let config = &job.config;
        let groups = group_by_directory(&job.files);

        run.enter(JobState::PreparingSchema);
        self.report("::: GENERATING INDEXES :::");
        if let Err(err) = prepare_schema(self.driver.as_ref(), config).await {
            run.record(Phase::Schema, None, &err);
            return;
        }
        self.report("    [✔] Indexes generated");

        run.enter(JobState::MaterializingNodes);
        self.report("::: CREATING NODES :::");
        'groups: for (dir, files) in &groups {
            self.report(format!("  # {}", dir.display()));
            for file in files {
                match self.materialize_file(file, config).await {
                    Ok(()) => {
                        run.outcome.materialized += 1;
                        self.report(format!("    [✔] {}", display_name(file)));
                    }
                    Err(err) => {
                        self.report(format!("    [✘] {}", display_name(file)));
                        run.record(Phase::Nodes, Some(file.as_path()), &err);
                        match config.failure_policy {
                            FailurePolicy::ContinuePhase => continue,
                            FailurePolicy::SkipGroup => break,
                            FailurePolicy::AbortJob => {
                                self.report("");
                                break 'groups;
                            }
                        }
                    }
                }
            }
            self.report("");
        }
        if run.failed() {
            info!("node phase failed, skipping relationship derivation");
            return;
        }

        run.enter(JobState::DerivingRelationships);
        self.report("::: POST PROCESSING :::");
        'groups: for (dir, files) in &groups {
            self.report(format!("  # {}", dir.display()));
            for file in files {
                self.report(format!("    [#] Post-Processing {}", display_name(file)));
                match self.derive_file(file, config).await {
                    Ok(()) => {
                        run.outcome.derived += 1;
                        self.report(format!("    [✔] {}", display_name(file)));
                    }
                    Err(err) => {
                        self.report(format!("    [✘] {}", display_name(file)));
                        run.record(Phase::Relationships, Some(file.as_path()), &err);
                        self.report("");
                        break 'groups;
                    }
                }
            }
            self.report("");
        }
    }

    async fn materialize_file(&self, path: &Path, config: &IngestConfig) -> IngestResult<()> {
        let doc = load_document(path).await?;
        let mut session = open_session(self.driver.as_ref()).await?;
        let result = materialize_nodes(session.as_mut(), &doc, config).await;
        close_session(session.as_mut()).await;
        let count = result?;
        debug!(file = %path.display(), label = %doc.entity_type, count, "file materialized");
        Ok(())
    }

    async fn derive_file(&self, path: &Path, config: &IngestConfig) -> IngestResult<()> {
        let doc = load_document(path).await?;
        let report = process_document(self.driver.as_ref(), doc, config).await?;
        debug!(file = %path.display(), chunks = report.chunks, pairs = report.pairs, "file post-processed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_directory_keeps_encounter_order() {
        let files: Vec<PathBuf> = ["/b/users.json", "/a/groups.json", "/b/computers.json", "domains.json"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let groups = group_by_directory(&files);
        let dirs: Vec<&Path> = groups.keys().map(PathBuf::as_path).collect();
        assert_eq!(dirs, vec![Path::new("/b"), Path::new("/a"), Path::new("")]);
        assert_eq!(
            groups[Path::new("/b")],
            vec![PathBuf::from("/b/users.json"), PathBuf::from("/b/computers.json")]
        );
    }

    #[test]
    fn test_outcome_reports_last_diagnostic() {
        let mut run = JobRun::new(2);
        run.record(Phase::Nodes, Some(Path::new("/a/1.json")), &IngestError::parse("/a/1.json", "bad"));
        run.record(Phase::Nodes, Some(Path::new("/b/2.json")), &IngestError::parse("/b/2.json", "worse"));
        let outcome = run.finish();
        assert_eq!(outcome.state, JobState::Failed);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.failures.len(), 2);
        assert!(outcome.diagnostic().unwrap().contains("worse"));
        assert_eq!(outcome.last_failure().unwrap().kind, ErrorKind::Parse);
    }

    #[test]
    fn test_clean_run_completes() {
        let outcome = JobRun::new(0).finish();
        assert_eq!(outcome.state, JobState::Completed);
        assert!(outcome.diagnostic().is_none());
    }
}
