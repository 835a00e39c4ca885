//! Node materialization: one bulk merge per document

use super::document::CollectorDocument;
use super::retry::run_with_retry;
use crate::config::IngestConfig;
use crate::driver::{GraphSession, NodeRow, Statement};
use crate::error::IngestResult;
use tracing::debug;

/// Bulk merge statement for every record of `doc`
pub fn node_statement(doc: &CollectorDocument) -> Statement {
    let rows = doc
        .records
        .iter()
        .map(|record| NodeRow {
            object_id: record.object_id.clone(),
            properties: record.property_map(),
        })
        .collect();
    Statement::MergeNodes {
        label: doc.entity_type.label(),
        rows,
    }
}

/// Merge every record of `doc` as a node carrying its type label
///
/// Returns the number of records merged.
pub async fn materialize_nodes(
    session: &mut dyn GraphSession,
    doc: &CollectorDocument,
    config: &IngestConfig,
) -> IngestResult<usize> {
    if doc.records.is_empty() {
        debug!(file = %doc.path.display(), "no records to materialize");
        return Ok(0);
    }
    let statement = node_statement(doc);
    run_with_retry(session, &statement, config).await?;
    debug!(
        file = %doc.path.display(),
        label = %doc.entity_type,
        count = doc.records.len(),
        "nodes merged"
    );
    Ok(doc.records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{GraphDriver, MemoryDriver};
    use crate::graph::Label;
    use crate::ingest::document::parse_document;
    use std::path::Path;

    fn doc(json: &str) -> CollectorDocument {
        parse_document(Path::new("computers.json"), json.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_materialize_sets_labels_and_properties() {
        let driver = MemoryDriver::new();
        let mut session = driver.open_session().await.unwrap();
        let doc = doc(
            r#"{"meta": {"type": "computers"}, "data": [
                {"ObjectIdentifier": "c1", "Properties": {"name": "WS01.CORP.LOCAL", "haslaps": true}},
                {"ObjectIdentifier": "c2", "Properties": {"name": "WS02.CORP.LOCAL"}}
            ]}"#,
        );

        let merged = materialize_nodes(session.as_mut(), &doc, &IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(merged, 2);

        let store = driver.store().read().await;
        assert_eq!(store.node_count(), 2);
        let node = store.find_node("c1").unwrap();
        assert!(node.has_label(&Label::new("Computer")));
        assert!(node.has_label(&Label::base()));
        assert_eq!(
            node.get_property("name").and_then(|v| v.as_string()),
            Some("WS01.CORP.LOCAL")
        );
    }

    #[tokio::test]
    async fn test_rematerialize_is_idempotent() {
        let driver = MemoryDriver::new();
        let mut session = driver.open_session().await.unwrap();
        let doc = doc(r#"{"meta": {"type": "computers"}, "data": [{"ObjectIdentifier": "c1"}]}"#);
        let config = IngestConfig::default();

        materialize_nodes(session.as_mut(), &doc, &config).await.unwrap();
        materialize_nodes(session.as_mut(), &doc, &config).await.unwrap();
        assert_eq!(driver.store().read().await.node_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_document_issues_nothing() {
        let driver = MemoryDriver::new();
        let mut session = driver.open_session().await.unwrap();
        let doc = doc(r#"{"meta": {"type": "computers"}, "data": []}"#);
        let merged = materialize_nodes(session.as_mut(), &doc, &IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(merged, 0);
    }
}
