use crate::catalog::DatabaseCatalog;
use crate::error::AdminHttpError;
use qserv_replica::{ReplicaInfo, ReplicaStore, TransactionInfo, TransactionState};
use qserv_time::{TimeProvider, TimeProviderRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Everything an ingest handler needs: the replica store, the database/table catalog, a clock,
/// and the set of workers eligible to host a newly placed chunk.
pub struct IngestState {
    pub store: Arc<dyn ReplicaStore>,
    pub catalog: Arc<DatabaseCatalog>,
    pub time_provider: TimeProviderRef,
    pub workers: Vec<String>,
}

impl IngestState {
    fn now(&self) -> qserv_time::TimestampMillis {
        self.time_provider.now_millis()
    }
}

#[derive(Debug, Deserialize)]
pub struct BeginTransactionRequest {
    pub database: String,
}

#[derive(Debug, Deserialize)]
pub struct EndTransactionRequest {
    pub abort: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddDatabaseRequest {
    pub database: String,
    pub family: String,
}

#[derive(Debug, Deserialize)]
pub struct AddTableRequest {
    pub database: String,
    pub table: String,
}

#[derive(Debug, Deserialize)]
pub struct AddChunkRequest {
    pub database: String,
    pub chunk: u32,
}

#[derive(Debug, Serialize)]
pub struct ChunkPlacement {
    #[serde(flatten)]
    pub replica: ReplicaInfo,
}

pub async fn begin_transaction(
    state: &IngestState,
    request: BeginTransactionRequest,
) -> Result<TransactionInfo, AdminHttpError> {
    if request.database.is_empty() {
        return Err(AdminHttpError::BadRequest("database must not be empty".to_string()));
    }
    Ok(state.store.begin_transaction(&request.database, state.now()).await?)
}

pub async fn end_transaction(
    state: &IngestState,
    id: Uuid,
    request: EndTransactionRequest,
) -> Result<(), AdminHttpError> {
    let target_state = if request.abort {
        TransactionState::Aborted
    } else {
        TransactionState::Committed
    };
    Ok(state.store.end_transaction(id, target_state, state.now()).await?)
}

pub async fn get_transaction(state: &IngestState, id: Uuid) -> Result<TransactionInfo, AdminHttpError> {
    state
        .store
        .get_transaction(id)
        .await?
        .ok_or_else(|| AdminHttpError::NotFound(format!("no transaction with id {id}")))
}

pub async fn add_database(state: &IngestState, request: AddDatabaseRequest) -> Result<(), AdminHttpError> {
    if request.database.is_empty() || request.family.is_empty() {
        return Err(AdminHttpError::BadRequest(
            "database and family must not be empty".to_string(),
        ));
    }
    state.catalog.add_database(request.database, request.family);
    Ok(())
}

pub async fn publish_database(state: &IngestState, name: &str) -> Result<(), AdminHttpError> {
    state.catalog.publish_database(name)
}

pub async fn add_table(state: &IngestState, request: AddTableRequest) -> Result<(), AdminHttpError> {
    state.catalog.add_table(&request.database, request.table)
}

pub async fn add_chunk(state: &IngestState, request: AddChunkRequest) -> Result<ChunkPlacement, AdminHttpError> {
    let replica = state
        .catalog
        .add_chunk(&request.database, request.chunk, &state.workers, state.store.as_ref(), state.now())
        .await?;
    Ok(ChunkPlacement { replica })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryReplicaStore;
    use qserv_time::SystemProvider;

    fn state() -> IngestState {
        IngestState {
            store: Arc::new(InMemoryReplicaStore::default()),
            catalog: Arc::new(DatabaseCatalog::new()),
            time_provider: Arc::new(SystemProvider::new()),
            workers: vec!["worker-a".to_string(), "worker-b".to_string()],
        }
    }

    #[tokio::test]
    async fn begin_then_end_transaction_round_trips() {
        let state = state();
        let txn = begin_transaction(
            &state,
            BeginTransactionRequest {
                database: "lsst_main".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(txn.is_open());

        end_transaction(&state, txn.id, EndTransactionRequest { abort: false }).await.unwrap();
        let reloaded = get_transaction(&state, txn.id).await.unwrap();
        assert_eq!(reloaded.state, TransactionState::Committed);
    }

    #[tokio::test]
    async fn begin_transaction_rejects_an_empty_database_name() {
        let state = state();
        let err = begin_transaction(&state, BeginTransactionRequest { database: String::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, AdminHttpError::BadRequest(_)));
    }

    #[tokio::test]
    async fn add_table_requires_an_existing_database() {
        let state = state();
        let err = add_table(
            &state,
            AddTableRequest {
                database: "missing".to_string(),
                table: "t".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdminHttpError::NotFound(_)));

        add_database(
            &state,
            AddDatabaseRequest {
                database: "lsst_main".to_string(),
                family: "lsst".to_string(),
            },
        )
        .await
        .unwrap();
        add_table(
            &state,
            AddTableRequest {
                database: "lsst_main".to_string(),
                table: "t".to_string(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn add_chunk_places_a_new_replica_on_an_eligible_worker() {
        let state = state();
        add_database(
            &state,
            AddDatabaseRequest {
                database: "lsst_main".to_string(),
                family: "lsst".to_string(),
            },
        )
        .await
        .unwrap();

        let placement = add_chunk(
            &state,
            AddChunkRequest {
                database: "lsst_main".to_string(),
                chunk: 9,
            },
        )
        .await
        .unwrap();
        assert!(state.workers.contains(&placement.replica.worker));
    }
}
