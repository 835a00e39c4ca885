//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dirgraph::driver::{GraphDriver, GraphSession, MemoryDriver, Row, Statement, StoreError, StoreResult};
use dirgraph::ingest::{BufferSink, Ingestor, StatsNotifier};
use dirgraph::IngestConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Matcher = Box<dyn Fn(&Statement) -> bool + Send + Sync>;

#[derive(Clone)]
enum Action {
    Fail(StoreError),
    Panic,
}

struct Fault {
    matcher: Matcher,
    action: Action,
    /// Remaining injections; `None` fails forever
    remaining: Option<usize>,
}

#[derive(Default)]
struct Script {
    statements: Mutex<Vec<Statement>>,
    faults: Mutex<Vec<Fault>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Driver over a [`MemoryDriver`] that records every statement in call
/// order and fails chosen statements on demand
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    inner: MemoryDriver,
    script: Arc<Script>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &MemoryDriver {
        &self.inner
    }

    /// Fail statements matching `matcher` with `error`, `times` times or
    /// forever
    pub fn fail_when<F>(&self, matcher: F, error: StoreError, times: Option<usize>)
    where
        F: Fn(&Statement) -> bool + Send + Sync + 'static,
    {
        self.inject(Box::new(matcher), Action::Fail(error), times);
    }

    /// Panic inside the session on statements matching `matcher`
    pub fn panic_when<F>(&self, matcher: F, times: Option<usize>)
    where
        F: Fn(&Statement) -> bool + Send + Sync + 'static,
    {
        self.inject(Box::new(matcher), Action::Panic, times);
    }

    fn inject(&self, matcher: Matcher, action: Action, remaining: Option<usize>) {
        self.script.faults.lock().unwrap().push(Fault {
            matcher,
            action,
            remaining,
        });
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.script.statements.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Statement) -> bool) -> usize {
        self.statements().iter().filter(|s| predicate(s)).count()
    }

    pub fn sessions_opened(&self) -> usize {
        self.script.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.script.closed.load(Ordering::SeqCst)
    }

    fn injected(&self, statement: &Statement) -> Option<Action> {
        let mut faults = self.script.faults.lock().unwrap();
        for fault in faults.iter_mut() {
            if !(fault.matcher)(statement) {
                continue;
            }
            match fault.remaining {
                Some(0) => continue,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            return Some(fault.action.clone());
        }
        None
    }
}

#[async_trait]
impl GraphDriver for ScriptedDriver {
    async fn open_session(&self) -> StoreResult<Box<dyn GraphSession>> {
        let inner = self.inner.open_session().await?;
        self.script.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            inner,
            driver: self.clone(),
        }))
    }
}

struct ScriptedSession {
    inner: Box<dyn GraphSession>,
    driver: ScriptedDriver,
}

#[async_trait]
impl GraphSession for ScriptedSession {
    async fn run(&mut self, statement: &Statement) -> StoreResult<Vec<Row>> {
        self.driver.script.statements.lock().unwrap().push(statement.clone());
        match self.driver.injected(statement) {
            Some(Action::Fail(err)) => return Err(err),
            Some(Action::Panic) => panic!("session crashed on {}", statement.cypher()),
            None => {}
        }
        self.inner.run(statement).await
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.driver.script.closed.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Statement matchers
pub fn merges_nodes_labeled(label: &'static str) -> impl Fn(&Statement) -> bool + Send + Sync + 'static {
    move |s| matches!(s, Statement::MergeNodes { label: l, .. } if l.as_str() == label)
}

pub fn merges_relationships_of(edge_type: &'static str) -> impl Fn(&Statement) -> bool + Send + Sync + 'static {
    move |s| matches!(s, Statement::MergeRelationships(b) if b.edge_type.as_str() == edge_type)
}

/// Config with no backoff so retry tests run instantly
pub fn fast_config() -> IngestConfig {
    IngestConfig::default().with_backoff_step(Duration::ZERO)
}

/// Write `value` as `dir/name`, creating `dir` if needed
pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

/// Collector document wrapper
pub fn collector(tag: &str, data: Value) -> Value {
    serde_json::json!({
        "meta": {"type": tag, "count": data.as_array().map_or(0, Vec::len), "version": 5},
        "data": data,
    })
}

pub struct Harness {
    pub driver: ScriptedDriver,
    pub log: Arc<BufferSink>,
    pub notifier: Arc<StatsNotifier>,
    pub ingestor: Ingestor,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_driver(ScriptedDriver::new())
    }

    pub fn with_driver(driver: ScriptedDriver) -> Self {
        let shared: Arc<dyn GraphDriver> = Arc::new(driver.clone());
        let log = Arc::new(BufferSink::new());
        let notifier = Arc::new(StatsNotifier::new(Arc::clone(&shared), fast_config()));
        let ingestor = Ingestor::new(shared, log.clone(), notifier.clone());
        Self {
            driver,
            log,
            notifier,
            ingestor,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.log.lines()
    }

    pub fn logged(&self, line: &str) -> bool {
        self.log.contains(line)
    }
}
