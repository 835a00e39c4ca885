//! Concurrent relationship derivation for one document
//!
//! Records are partitioned into chunks, each chunk gets its own session and
//! its own task, and at most `worker_count` tasks run at once. Sessions are
//! opened up front and parked in slots the tasks only lock, so every session
//! is closed once all tasks have been joined, even when a task panics.

use super::chunk::{partition, Chunk};
use super::document::{CollectorDocument, EntityRecord, EntityType};
use super::relationships::{derive_batches, sync_laps};
use super::retry::run_with_retry;
use super::schema::{close_session, open_session};
use crate::config::IngestConfig;
use crate::driver::{GraphDriver, GraphSession, Statement};
use crate::error::{IngestError, IngestResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What one document's relationship pass wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub chunks: usize,
    pub batches: usize,
    pub pairs: usize,
}

#[derive(Debug, Default)]
struct ChunkReport {
    batches: usize,
    pairs: usize,
}

type SessionSlot = Arc<Mutex<Box<dyn GraphSession>>>;
type ChunkTask = JoinHandle<IngestResult<ChunkReport>>;

async fn process_chunk(
    session: &mut dyn GraphSession,
    entity_type: &EntityType,
    records: &[EntityRecord],
    config: &IngestConfig,
    abort: &AtomicBool,
) -> IngestResult<ChunkReport> {
    let mut report = ChunkReport::default();
    for batch in derive_batches(entity_type, records, config.legacy_mode) {
        if abort.load(Ordering::Acquire) {
            return Ok(report);
        }
        let pairs = batch.len();
        run_with_retry(session, &Statement::MergeRelationships(batch), config).await?;
        report.batches += 1;
        report.pairs += pairs;
    }
    if *entity_type == EntityType::Group && !abort.load(Ordering::Acquire) {
        let pairs = sync_laps(session, config).await?;
        if pairs > 0 {
            report.batches += 1;
            report.pairs += pairs;
        }
    }
    Ok(report)
}

fn spawn_chunk(
    slot: SessionSlot,
    chunk: Chunk<EntityRecord>,
    entity_type: EntityType,
    config: IngestConfig,
    permits: Arc<Semaphore>,
    abort: Arc<AtomicBool>,
) -> ChunkTask {
    tokio::spawn(async move {
        let result = match permits.acquire_owned().await {
            Ok(_permit) => {
                debug!(chunk = chunk.ordinal, records = chunk.len(), "chunk started");
                let mut session = slot.lock().await;
                process_chunk(&mut **session, &entity_type, &chunk.records, &config, &abort).await
            }
            Err(_) => Err(IngestError::Worker {
                ordinal: chunk.ordinal,
                reason: "worker pool closed".to_string(),
            }),
        };
        if result.is_err() {
            abort.store(true, Ordering::Release);
        }
        result
    })
}

/// Derive and write every relationship of `doc`
///
/// Returns the first chunk failure, in chunk order, after all chunk tasks
/// have finished and their sessions have been closed.
pub async fn process_document(
    driver: &dyn GraphDriver,
    doc: CollectorDocument,
    config: &IngestConfig,
) -> IngestResult<ExecutionReport> {
    let CollectorDocument { path, entity_type, records, .. } = doc;
    let chunks = partition(records, config.worker_count);
    if chunks.is_empty() {
        debug!(file = %path.display(), "no records, nothing to derive");
        return Ok(ExecutionReport::default());
    }

    let mut sessions = Vec::with_capacity(chunks.len());
    for _ in 0..chunks.len() {
        match open_session(driver).await {
            Ok(session) => sessions.push(session),
            Err(err) => {
                for mut session in sessions {
                    close_session(session.as_mut()).await;
                }
                return Err(err);
            }
        }
    }

    let chunk_count = chunks.len();
    let permits = Arc::new(Semaphore::new(config.worker_count.max(1)));
    let abort = Arc::new(AtomicBool::new(false));
    let slots: Vec<SessionSlot> = sessions.into_iter().map(|s| Arc::new(Mutex::new(s))).collect();
    let tasks: Vec<(usize, ChunkTask)> = chunks
        .into_iter()
        .zip(&slots)
        .map(|(chunk, slot)| {
            let ordinal = chunk.ordinal;
            let task = spawn_chunk(
                Arc::clone(slot),
                chunk,
                entity_type.clone(),
                config.clone(),
                Arc::clone(&permits),
                Arc::clone(&abort),
            );
            (ordinal, task)
        })
        .collect();

    let mut report = ExecutionReport {
        chunks: chunk_count,
        ..Default::default()
    };
    let mut first_error: Option<IngestError> = None;
    for (ordinal, task) in tasks {
        match task.await {
            Ok(Ok(chunk)) => {
                report.batches += chunk.batches;
                report.pairs += chunk.pairs;
            }
            Ok(Err(err)) => {
                warn!(file = %path.display(), chunk = ordinal, error = %err, "chunk failed");
                first_error.get_or_insert(err);
            }
            Err(join_err) => {
                abort.store(true, Ordering::Release);
                warn!(file = %path.display(), chunk = ordinal, "chunk task did not complete");
                first_error.get_or_insert(IngestError::Worker {
                    ordinal,
                    reason: join_err.to_string(),
                });
            }
        }
    }

    for slot in slots {
        let mut session = slot.lock().await;
        close_session(&mut **session).await;
    }

    match first_error {
        Some(err) => Err(err),
        None => {
            debug!(
                file = %path.display(),
                chunks = report.chunks,
                batches = report.batches,
                pairs = report.pairs,
                "relationships merged"
            );
            Ok(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use crate::graph::{Label, PropertyMap, PropertyValue};
    use crate::ingest::document::parse_document;
    use std::path::Path;

    fn doc(json: &str) -> CollectorDocument {
        parse_document(Path::new("groups.json"), json.as_bytes()).unwrap()
    }

    async fn seed(driver: &MemoryDriver, nodes: &[(&str, &str)]) {
        let mut store = driver.store().write().await;
        for (id, label) in nodes {
            store.merge_node(id, &[Label::new(*label)], &PropertyMap::new()).unwrap();
        }
    }

    #[tokio::test]
    async fn test_members_across_chunks() {
        let driver = MemoryDriver::new();
        seed(&driver, &[("g1", "Group"), ("g2", "Group"), ("g3", "Group"), ("u1", "User")]).await;
        let doc = doc(
            r#"{"meta": {"type": "groups"}, "data": [
                {"ObjectIdentifier": "g1", "Members": [{"ObjectIdentifier": "u1"}]},
                {"ObjectIdentifier": "g2", "Members": [{"ObjectIdentifier": "u1"}]},
                {"ObjectIdentifier": "g3", "Members": [{"ObjectIdentifier": "g1"}]}
            ]}"#,
        );

        let config = IngestConfig::default().with_workers(2);
        let report = process_document(&driver, doc, &config).await.unwrap();
        assert_eq!(report.chunks, 2);
        assert_eq!(report.pairs, 3);

        let store = driver.store().read().await;
        assert_eq!(store.edge_count(), 3);
        assert!(store.has_edge("g1", "MemberOf", "g3"));
    }

    #[tokio::test]
    async fn test_empty_document() {
        let driver = MemoryDriver::new();
        let doc = doc(r#"{"meta": {"type": "groups"}, "data": []}"#);
        let report = process_document(&driver, doc, &IngestConfig::default()).await.unwrap();
        assert_eq!(report, ExecutionReport::default());
    }

    #[tokio::test]
    async fn test_group_document_syncs_laps() {
        let driver = MemoryDriver::new();
        {
            let mut store = driver.store().write().await;
            let mut laps = PropertyMap::new();
            laps.insert("haslaps".to_string(), PropertyValue::Boolean(true));
            store.merge_node("c1", &[Label::new("Computer")], &laps).unwrap();
            let mut admin = PropertyMap::new();
            admin.insert("admincount".to_string(), PropertyValue::Boolean(true));
            store.merge_node("S-1-5-21-9-512", &[Label::new("Group")], &admin).unwrap();
            store.merge_node("S-1-5-21-9-1200", &[Label::new("Group")], &admin).unwrap();
        }
        let doc = doc(
            r#"{"meta": {"type": "groups"}, "data": [
                {"ObjectIdentifier": "S-1-5-21-9-512"},
                {"ObjectIdentifier": "S-1-5-21-9-1200"}
            ]}"#,
        );

        process_document(&driver, doc, &IngestConfig::default()).await.unwrap();
        let store = driver.store().read().await;
        assert!(store.has_edge("S-1-5-21-9-512", "SyncLAPSPassword", "c1"));
        assert!(!store.has_edge("S-1-5-21-9-1200", "SyncLAPSPassword", "c1"));
        assert_eq!(store.edge_count(), 1);
    }
}
