//! Schema preparation and store purge

use super::document::EntityType;
use super::retry::run_with_retry;
use crate::config::IngestConfig;
use crate::driver::{GraphDriver, GraphSession, Statement};
use crate::error::{IngestError, IngestResult};
use crate::graph::{Label, NAME_KEY, OBJECT_ID_KEY};
use tracing::{info, warn};

fn constraint_name(label: &Label) -> String {
    format!("{}_objectid_constraint", label.as_str().to_ascii_lowercase())
}

fn index_name(label: &Label) -> String {
    format!("{}_name_index", label.as_str().to_ascii_lowercase())
}

fn constraint_labels() -> impl Iterator<Item = Label> {
    std::iter::once(Label::base()).chain(EntityType::concrete().into_iter().map(|ty| ty.label()))
}

/// Every schema statement in issue order: constraints, name indexes, then
/// the wait for index population
pub fn schema_statements() -> Vec<Statement> {
    let constraints = constraint_labels().map(|label| Statement::CreateConstraint {
        name: constraint_name(&label),
        label,
        property: OBJECT_ID_KEY.to_string(),
    });
    let indexes = EntityType::concrete().into_iter().map(|ty| {
        let label = ty.label();
        Statement::CreateIndex {
            name: index_name(&label),
            label,
            property: NAME_KEY.to_string(),
        }
    });
    constraints
        .chain(indexes)
        .chain(std::iter::once(Statement::AwaitIndexes))
        .collect()
}

/// Create constraints and indexes and wait until every index is online
pub async fn prepare_schema(driver: &dyn GraphDriver, config: &IngestConfig) -> IngestResult<()> {
    let mut session = open_session(driver).await?;
    let result = apply(session.as_mut(), &schema_statements(), config).await;
    close_session(session.as_mut()).await;
    result?;
    info!("schema ready");
    Ok(())
}

/// Drop the name indexes and constraints, then delete every node and
/// relationship
///
/// Returns the number of nodes deleted.
pub async fn clear_store(driver: &dyn GraphDriver, config: &IngestConfig) -> IngestResult<usize> {
    let mut statements: Vec<Statement> = EntityType::concrete()
        .into_iter()
        .map(|ty| Statement::DropIndex { name: index_name(&ty.label()) })
        .collect();
    statements.extend(constraint_labels().map(|label| Statement::DropConstraint {
        name: constraint_name(&label),
    }));

    let mut session = open_session(driver).await?;
    let result = async {
        apply(session.as_mut(), &statements, config).await?;
        let rows = run_with_retry(session.as_mut(), &Statement::DetachDeleteAll, config).await?;
        let deleted = rows.first().and_then(|row| row.get_integer("deleted")).unwrap_or(0);
        Ok::<usize, IngestError>(deleted as usize)
    }
    .await;
    close_session(session.as_mut()).await;

    let deleted = result?;
    info!(deleted, "store cleared");
    Ok(deleted)
}

async fn apply(session: &mut dyn GraphSession, statements: &[Statement], config: &IngestConfig) -> IngestResult<()> {
    for statement in statements {
        run_with_retry(session, statement, config).await?;
    }
    Ok(())
}

pub(crate) async fn open_session(driver: &dyn GraphDriver) -> IngestResult<Box<dyn GraphSession>> {
    driver.open_session().await.map_err(|source| IngestError::Store {
        context: "open session".to_string(),
        statement: String::new(),
        source,
    })
}

pub(crate) async fn close_session(session: &mut dyn GraphSession) {
    if let Err(err) = session.close().await {
        warn!(error = %err, "failed to close session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;
    use crate::graph::IndexState;

    #[test]
    fn test_statement_order() {
        let statements = schema_statements();
        assert_eq!(statements.len(), 8 + 7 + 1);
        assert!(matches!(
            &statements[0],
            Statement::CreateConstraint { name, .. } if name == "base_objectid_constraint"
        ));
        assert!(statements[..8]
            .iter()
            .all(|s| matches!(s, Statement::CreateConstraint { .. })));
        assert!(statements[8..15]
            .iter()
            .all(|s| matches!(s, Statement::CreateIndex { .. })));
        assert_eq!(statements.last(), Some(&Statement::AwaitIndexes));
        assert!(statements.iter().any(|s| s.cypher().contains("ou_name_index")));
    }

    #[tokio::test]
    async fn test_prepare_brings_indexes_online() {
        let driver = MemoryDriver::new();
        prepare_schema(&driver, &IngestConfig::default()).await.unwrap();
        // repeatable
        prepare_schema(&driver, &IngestConfig::default()).await.unwrap();

        let store = driver.store().read().await;
        assert_eq!(store.schema().constraints().count(), 8);
        assert_eq!(store.schema().indexes().count(), 7);
        assert!(store.schema().indexes().all(|idx| idx.state == IndexState::Online));
        assert!(store.schema().constraint("gpo_objectid_constraint").is_some());
        assert!(store.schema().index("domain_name_index").is_some());
    }

    #[tokio::test]
    async fn test_clear_store() {
        let driver = MemoryDriver::new();
        let config = IngestConfig::default();
        prepare_schema(&driver, &config).await.unwrap();
        {
            let mut store = driver.store().write().await;
            store.merge_node("u1", &[Label::new("User")], &Default::default()).unwrap();
            store.merge_node("g1", &[Label::new("Group")], &Default::default()).unwrap();
            store
                .merge_edge("u1", "g1", &"MemberOf".into(), None, None)
                .unwrap();
        }

        let deleted = clear_store(&driver, &config).await.unwrap();
        assert_eq!(deleted, 2);

        let store = driver.store().read().await;
        assert_eq!(store.node_count(), 0);
        assert_eq!(store.edge_count(), 0);
        assert_eq!(store.schema().constraints().count(), 0);
        assert_eq!(store.schema().indexes().count(), 0);
    }
}
