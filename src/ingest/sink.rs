//! Progress reporting and completion collaborators
//!
//! Both are handed to the [`Ingestor`](super::Ingestor) at construction.
//! Reporting is observational: a sink must return promptly and never fail.

use super::orchestrator::JobOutcome;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

/// Receives human-readable progress lines
pub trait LogSink: Send + Sync {
    fn report(&self, line: &str);
}

/// Told once when a job ends, then asked to refresh store statistics
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    fn job_finished(&self, outcome: &JobOutcome);

    async fn refresh_statistics(&self) {}
}

/// Forwards progress lines to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn report(&self, line: &str) {
        if !line.is_empty() {
            info!(target: "dirgraph::progress", "{}", line);
        }
    }
}

/// Pushes progress lines into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl LogSink for ChannelSink {
    fn report(&self, line: &str) {
        // A dropped receiver only means nobody is watching
        let _ = self.sender.send(line.to_string());
    }
}

/// Keeps every progress line in memory
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l == line)
    }
}

impl LogSink for BufferSink {
    fn report(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Notifier that only logs the outcome
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

#[async_trait]
impl CompletionNotifier for LoggingNotifier {
    fn job_finished(&self, outcome: &JobOutcome) {
        match outcome.diagnostic() {
            None => info!(files = outcome.files, "ingestion completed"),
            Some(diagnostic) => error!(failures = outcome.failures.len(), "ingestion failed: {}", diagnostic),
        }
    }
}
