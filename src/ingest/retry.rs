//! Bounded retry around a single store statement
//!
//! Transient store failures are retried with linear backoff; anything else
//! is returned at once. This is the only place store failures become
//! [`IngestError`]s.

use crate::config::IngestConfig;
use crate::driver::{GraphSession, Row, Statement};
use crate::error::{IngestError, IngestResult};
use tracing::{debug, warn};

/// Run `statement`, retrying transient failures up to `config.retry_limit`
/// attempts in total
///
/// After failed attempt `n` the task sleeps `config.backoff_step * n`.
pub async fn run_with_retry(
    session: &mut dyn GraphSession,
    statement: &Statement,
    config: &IngestConfig,
) -> IngestResult<Vec<Row>> {
    let limit = config.retry_limit.max(1);
    let mut attempt: u32 = 1;
    loop {
        match session.run(statement).await {
            Ok(rows) => {
                if attempt > 1 {
                    debug!(attempt, statement = %statement.summary(), "statement succeeded after retry");
                }
                return Ok(rows);
            }
            Err(err) if !err.is_transient() => {
                return Err(IngestError::Store {
                    context: statement.summary(),
                    statement: statement.cypher(),
                    source: err,
                });
            }
            Err(err) if attempt >= limit => {
                warn!(attempts = attempt, statement = %statement.summary(), "giving up on transient failure");
                return Err(IngestError::RetriesExhausted {
                    context: statement.summary(),
                    statement: statement.cypher(),
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => {
                let delay = config.backoff_step * attempt;
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    statement = %statement.summary(),
                    error = %err,
                    "transient store failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{StoreError, StoreResult};
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Session replaying a fixed sequence of outcomes
    struct ScriptedSession {
        outcomes: VecDeque<StoreResult<Vec<Row>>>,
        calls: u32,
    }

    impl ScriptedSession {
        fn new(outcomes: Vec<StoreResult<Vec<Row>>>) -> Self {
            Self {
                outcomes: outcomes.into(),
                calls: 0,
            }
        }
    }

    #[async_trait]
    impl GraphSession for ScriptedSession {
        async fn run(&mut self, _statement: &Statement) -> StoreResult<Vec<Row>> {
            self.calls += 1;
            self.outcomes
                .pop_front()
                .unwrap_or_else(|| Err(StoreError::transient("lock timeout")))
        }

        async fn close(&mut self) -> StoreResult<()> {
            Ok(())
        }
    }

    fn config(retries: u32) -> IngestConfig {
        IngestConfig::default()
            .with_retries(retries)
            .with_backoff_step(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let mut session = ScriptedSession::new(vec![
            Err(StoreError::transient("deadlock")),
            Err(StoreError::transient("deadlock")),
            Ok(vec![Row::new().with("count", 1i64)]),
        ]);
        let rows = run_with_retry(&mut session, &Statement::AwaitIndexes, &config(5))
            .await
            .unwrap();
        assert_eq!(rows[0].get_integer("count"), Some(1));
        assert_eq!(session.calls, 3);
    }

    #[tokio::test]
    async fn test_exhausts_retry_limit() {
        let mut session = ScriptedSession::new(Vec::new());
        let err = run_with_retry(&mut session, &Statement::AwaitIndexes, &config(4))
            .await
            .unwrap_err();
        assert_eq!(session.calls, 4);
        assert_eq!(err.kind(), ErrorKind::TransientStore);
        assert!(matches!(err, IngestError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(err.statement(), Some("CALL db.awaitIndexes()"));
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let mut session = ScriptedSession::new(vec![Err(StoreError::fatal("constraint violated"))]);
        let err = run_with_retry(&mut session, &Statement::DetachDeleteAll, &config(15))
            .await
            .unwrap_err();
        assert_eq!(session.calls, 1);
        assert_eq!(err.kind(), ErrorKind::FatalStore);
        assert!(err.diagnostic().contains("constraint violated"));
    }

    #[tokio::test]
    async fn test_backoff_is_linear() {
        let mut session = ScriptedSession::new(vec![
            Err(StoreError::transient("busy")),
            Err(StoreError::transient("busy")),
            Ok(Vec::new()),
        ]);
        let config = IngestConfig::default()
            .with_retries(3)
            .with_backoff_step(Duration::from_millis(10));
        let started = std::time::Instant::now();
        run_with_retry(&mut session, &Statement::AwaitIndexes, &config)
            .await
            .unwrap();
        // 10ms after the first failure, 20ms after the second
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
