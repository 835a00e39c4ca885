//! Store-wide summary statistics

use super::orchestrator::JobOutcome;
use super::relationships::kind;
use super::retry::run_with_retry;
use super::schema::{close_session, open_session};
use super::sink::CompletionNotifier;
use crate::config::IngestConfig;
use crate::driver::{GraphDriver, GraphSession, Statement};
use crate::error::IngestResult;
use crate::graph::{EdgeType, Label};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Labels whose node counts are reported
pub const SUMMARY_LABELS: [&str; 6] = ["User", "Group", "Computer", "OU", "GPO", "Domain"];

/// Snapshot of what the store holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSummary {
    /// Sorted relationship types present in the store
    pub relationship_types: Vec<String>,
    pub relationship_count: u64,
    /// Relationships derived from access-control entries
    pub acl_count: u64,
    pub node_counts: IndexMap<String, u64>,
}

impl GraphSummary {
    pub fn node_count(&self, label: &str) -> u64 {
        self.node_counts.get(label).copied().unwrap_or(0)
    }
}

async fn count(session: &mut dyn GraphSession, statement: Statement, config: &IngestConfig) -> IngestResult<u64> {
    let rows = run_with_retry(session, &statement, config).await?;
    let value = rows.first().and_then(|row| row.get_integer("count")).unwrap_or(0);
    Ok(value.max(0) as u64)
}

async fn collect_with(session: &mut dyn GraphSession, config: &IngestConfig) -> IngestResult<GraphSummary> {
    let mut relationship_types: Vec<String> = run_with_retry(session, &Statement::RelationshipTypes, config)
        .await?
        .iter()
        .filter_map(|row| row.get_str("relationshipType").map(str::to_string))
        .collect();
    relationship_types.sort();

    let relationship_count = count(session, Statement::CountRelationships { types: None }, config).await?;

    let acl_types: Vec<EdgeType> = relationship_types
        .iter()
        .filter(|t| kind::is_acl(t))
        .map(|t| EdgeType::new(t.as_str()))
        .collect();
    let acl_count = if acl_types.is_empty() {
        0
    } else {
        count(session, Statement::CountRelationships { types: Some(acl_types) }, config).await?
    };

    let mut node_counts = IndexMap::new();
    for label in SUMMARY_LABELS {
        let n = count(session, Statement::CountNodes { label: Label::new(label) }, config).await?;
        node_counts.insert(label.to_string(), n);
    }

    Ok(GraphSummary {
        relationship_types,
        relationship_count,
        acl_count,
        node_counts,
    })
}

/// Query the store for a [`GraphSummary`]
pub async fn collect_summary(driver: &dyn GraphDriver, config: &IngestConfig) -> IngestResult<GraphSummary> {
    let mut session = open_session(driver).await?;
    let result = collect_with(session.as_mut(), config).await;
    close_session(session.as_mut()).await;
    result
}

/// Notifier that keeps the last outcome and refreshes a summary on request
pub struct StatsNotifier {
    driver: Arc<dyn GraphDriver>,
    config: IngestConfig,
    outcome: Mutex<Option<JobOutcome>>,
    summary: Mutex<Option<GraphSummary>>,
}

impl StatsNotifier {
    pub fn new(driver: Arc<dyn GraphDriver>, config: IngestConfig) -> Self {
        Self {
            driver,
            config,
            outcome: Mutex::new(None),
            summary: Mutex::new(None),
        }
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        self.outcome.lock().unwrap().clone()
    }

    pub fn summary(&self) -> Option<GraphSummary> {
        self.summary.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionNotifier for StatsNotifier {
    fn job_finished(&self, outcome: &JobOutcome) {
        *self.outcome.lock().unwrap() = Some(outcome.clone());
    }

    async fn refresh_statistics(&self) {
        match collect_summary(self.driver.as_ref(), &self.config).await {
            Ok(summary) => *self.summary.lock().unwrap() = Some(summary),
            Err(err) => warn!(error = %err, "failed to refresh store statistics"),
        }
    }
}
