use crate::replica_info::{ReplicaInfo, ReplicaStatus, TransactionInfo, TransactionState};
use async_trait::async_trait;
use observability_deps::tracing::debug;
use parking_lot::Mutex as PlMutex;
use qserv_time::TimestampMillis;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// How long a cached replication level stays valid before [`ReplicationLevelCache::get`] treats
/// it as stale. Matches the ~240s window the replication-level report used in the original tool.
pub const REPLICATION_LEVEL_CACHE_TTL_MILLIS: i64 = 240_000;

/// Caches the per-database replication level (chunks found at or above the target copy count)
/// so [`super::jobs::ReplicateJob`]/[`super::jobs::PurgeJob`] don't recompute it from the store
/// on every chunk; entries older than [`REPLICATION_LEVEL_CACHE_TTL_MILLIS`] are treated as
/// absent.
#[derive(Debug, Default)]
pub struct ReplicationLevelCache {
    entries: PlMutex<HashMap<String, (f64, TimestampMillis)>>,
}

impl ReplicationLevelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached level for `database` if one was recorded within the TTL of `now`.
    pub fn get(&self, database: &str, now: TimestampMillis) -> Option<f64> {
        let entries = self.entries.lock();
        let (level, recorded_at) = entries.get(database)?;
        if now - recorded_at > REPLICATION_LEVEL_CACHE_TTL_MILLIS {
            None
        } else {
            Some(*level)
        }
    }

    pub fn set(&self, database: impl Into<String>, level: f64, now: TimestampMillis) {
        self.entries.lock().insert(database.into(), (level, now));
    }

    pub fn invalidate(&self, database: &str) {
        self.entries.lock().remove(database);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("no transaction with id {0}")]
    NoSuchTransaction(Uuid),
}

fn status_to_str(status: ReplicaStatus) -> &'static str {
    match status {
        ReplicaStatus::NotFound => "not_found",
        ReplicaStatus::Complete => "complete",
        ReplicaStatus::Incomplete => "incomplete",
    }
}

fn status_from_str(s: &str) -> ReplicaStatus {
    match s {
        "complete" => ReplicaStatus::Complete,
        "incomplete" => ReplicaStatus::Incomplete,
        _ => ReplicaStatus::NotFound,
    }
}

fn txn_state_to_str(state: TransactionState) -> &'static str {
    match state {
        TransactionState::Started => "started",
        TransactionState::Committed => "committed",
        TransactionState::Aborted => "aborted",
    }
}

fn txn_state_from_str(s: &str) -> TransactionState {
    match s {
        "committed" => TransactionState::Committed,
        "aborted" => TransactionState::Aborted,
        _ => TransactionState::Started,
    }
}

/// Persistent home for replica placements and ingest transactions, queried by the replication
/// jobs and the controller's admin surface alike.
#[async_trait]
pub trait ReplicaStore: Send + Sync {
    async fn record_replica(&self, replica: &ReplicaInfo) -> Result<(), StoreError>;
    async fn delete_replica(&self, database: &str, chunk: u32, worker: &str) -> Result<(), StoreError>;
    async fn find_replicas(&self, database: &str, chunk: u32) -> Result<Vec<ReplicaInfo>, StoreError>;
    async fn find_all_replicas(&self, database: &str) -> Result<Vec<ReplicaInfo>, StoreError>;
    async fn find_replicas_by_worker(&self, worker: &str) -> Result<Vec<ReplicaInfo>, StoreError>;

    async fn begin_transaction(
        &self,
        database: &str,
        now: TimestampMillis,
    ) -> Result<TransactionInfo, StoreError>;
    async fn end_transaction(
        &self,
        id: Uuid,
        state: TransactionState,
        now: TimestampMillis,
    ) -> Result<(), StoreError>;
    async fn get_transaction(&self, id: Uuid) -> Result<Option<TransactionInfo>, StoreError>;

    /// Records (or refreshes) a controller's `(id, host, pid, start_time)` row, so concurrent
    /// controller processes and the jobs they launch can be told apart.
    async fn register_controller(
        &self,
        id: Uuid,
        host: &str,
        pid: u32,
        start_time: TimestampMillis,
    ) -> Result<(), StoreError>;
}

/// `PostgreSQL`-backed [`ReplicaStore`].
#[derive(Debug, Clone)]
pub struct PgReplicaStore {
    pool: PgPool,
}

impl PgReplicaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReplicaStore for PgReplicaStore {
    async fn record_replica(&self, replica: &ReplicaInfo) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO replica (database, chunk, worker, status, verify_time)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (database, chunk, worker)
            DO UPDATE SET status = EXCLUDED.status, verify_time = EXCLUDED.verify_time
            "#,
        )
        .bind(&replica.database)
        .bind(replica.chunk as i64)
        .bind(&replica.worker)
        .bind(status_to_str(replica.status))
        .bind(replica.verify_time)
        .execute(&self.pool)
        .await?;
        debug!(database = %replica.database, chunk = replica.chunk, worker = %replica.worker, "recorded replica");
        Ok(())
    }

    async fn delete_replica(&self, database: &str, chunk: u32, worker: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM replica WHERE database = $1 AND chunk = $2 AND worker = $3")
            .bind(database)
            .bind(chunk as i64)
            .bind(worker)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_replicas(&self, database: &str, chunk: u32) -> Result<Vec<ReplicaInfo>, StoreError> {
        let rows = sqlx::query(
            "SELECT worker, status, verify_time FROM replica WHERE database = $1 AND chunk = $2",
        )
        .bind(database)
        .bind(chunk as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                ReplicaInfo::new(
                    status_from_str(row.get::<String, _>("status").as_str()),
                    row.get::<String, _>("worker"),
                    database,
                    chunk,
                    row.get::<i64, _>("verify_time"),
                )
            })
            .collect())
    }

    async fn find_all_replicas(&self, database: &str) -> Result<Vec<ReplicaInfo>, StoreError> {
        let rows = sqlx::query("SELECT worker, chunk, status, verify_time FROM replica WHERE database = $1")
            .bind(database)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                ReplicaInfo::new(
                    status_from_str(row.get::<String, _>("status").as_str()),
                    row.get::<String, _>("worker"),
                    database,
                    row.get::<i64, _>("chunk") as u32,
                    row.get::<i64, _>("verify_time"),
                )
            })
            .collect())
    }

    async fn find_replicas_by_worker(&self, worker: &str) -> Result<Vec<ReplicaInfo>, StoreError> {
        let rows = sqlx::query("SELECT database, chunk, status, verify_time FROM replica WHERE worker = $1")
            .bind(worker)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                ReplicaInfo::new(
                    status_from_str(row.get::<String, _>("status").as_str()),
                    worker,
                    row.get::<String, _>("database"),
                    row.get::<i64, _>("chunk") as u32,
                    row.get::<i64, _>("verify_time"),
                )
            })
            .collect())
    }

    async fn begin_transaction(
        &self,
        database: &str,
        now: TimestampMillis,
    ) -> Result<TransactionInfo, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO super_transaction (id, database, state, begin_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(database)
        .bind(txn_state_to_str(TransactionState::Started))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(TransactionInfo::new(id, database, now))
    }

    async fn end_transaction(
        &self,
        id: Uuid,
        state: TransactionState,
        now: TimestampMillis,
    ) -> Result<(), StoreError> {
        let affected = sqlx::query(
            "UPDATE super_transaction SET state = $2, end_time = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(txn_state_to_str(state))
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if affected == 0 {
            return Err(StoreError::NoSuchTransaction(id));
        }
        Ok(())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<TransactionInfo>, StoreError> {
        let row = sqlx::query(
            "SELECT database, state, begin_time, end_time FROM super_transaction WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| TransactionInfo {
            id,
            database: row.get("database"),
            state: txn_state_from_str(row.get::<String, _>("state").as_str()),
            begin_time: row.get("begin_time"),
            end_time: row.get("end_time"),
        }))
    }

    async fn register_controller(
        &self,
        id: Uuid,
        host: &str,
        pid: u32,
        start_time: TimestampMillis,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO controller (id, host, pid, start_time)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET host = EXCLUDED.host, pid = EXCLUDED.pid, start_time = EXCLUDED.start_time
            "#,
        )
        .bind(id)
        .bind(host)
        .bind(pid as i64)
        .bind(start_time)
        .execute(&self.pool)
        .await?;
        debug!(%id, host, pid, "registered controller");
        Ok(())
    }
}

/// An in-memory [`ReplicaStore`] for exercising the replication jobs and the controller without
/// a live Postgres instance.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct InMemoryReplicaStore {
        replicas: Mutex<Vec<ReplicaInfo>>,
        transactions: Mutex<HashMap<Uuid, TransactionInfo>>,
        controllers: Mutex<HashMap<Uuid, (String, u32, TimestampMillis)>>,
    }

    #[async_trait]
    impl ReplicaStore for InMemoryReplicaStore {
        async fn record_replica(&self, replica: &ReplicaInfo) -> Result<(), StoreError> {
            let mut replicas = self.replicas.lock();
            replicas.retain(|r| !(r.database == replica.database && r.chunk == replica.chunk && r.worker == replica.worker));
            replicas.push(replica.clone());
            Ok(())
        }

        async fn delete_replica(&self, database: &str, chunk: u32, worker: &str) -> Result<(), StoreError> {
            self.replicas
                .lock()
                .retain(|r| !(r.database == database && r.chunk == chunk && r.worker == worker));
            Ok(())
        }

        async fn find_replicas(&self, database: &str, chunk: u32) -> Result<Vec<ReplicaInfo>, StoreError> {
            Ok(self
                .replicas
                .lock()
                .iter()
                .filter(|r| r.database == database && r.chunk == chunk)
                .cloned()
                .collect())
        }

        async fn find_all_replicas(&self, database: &str) -> Result<Vec<ReplicaInfo>, StoreError> {
            Ok(self
                .replicas
                .lock()
                .iter()
                .filter(|r| r.database == database)
                .cloned()
                .collect())
        }

        async fn find_replicas_by_worker(&self, worker: &str) -> Result<Vec<ReplicaInfo>, StoreError> {
            Ok(self.replicas.lock().iter().filter(|r| r.worker == worker).cloned().collect())
        }

        async fn begin_transaction(&self, database: &str, now: TimestampMillis) -> Result<TransactionInfo, StoreError> {
            let txn = TransactionInfo::new(Uuid::new_v4(), database, now);
            self.transactions.lock().insert(txn.id, txn.clone());
            Ok(txn)
        }

        async fn end_transaction(&self, id: Uuid, state: TransactionState, now: TimestampMillis) -> Result<(), StoreError> {
            let mut transactions = self.transactions.lock();
            let txn = transactions.get_mut(&id).ok_or(StoreError::NoSuchTransaction(id))?;
            txn.state = state;
            txn.end_time = Some(now);
            Ok(())
        }

        async fn get_transaction(&self, id: Uuid) -> Result<Option<TransactionInfo>, StoreError> {
            Ok(self.transactions.lock().get(&id).cloned())
        }

        async fn register_controller(
            &self,
            id: Uuid,
            host: &str,
            pid: u32,
            start_time: TimestampMillis,
        ) -> Result<(), StoreError> {
            self.controllers.lock().insert(id, (host.to_string(), pid, start_time));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::InMemoryReplicaStore;
    use super::*;
    use crate::replica_info::ReplicaStatus;

    #[tokio::test]
    async fn record_then_find_all_replicas_round_trips() {
        let store = InMemoryReplicaStore::default();
        store
            .record_replica(&ReplicaInfo::new(ReplicaStatus::Complete, "worker-a", "lsst", 1, 100))
            .await
            .unwrap();
        let found = store.find_all_replicas("lsst").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].worker, "worker-a");
    }

    #[tokio::test]
    async fn ending_an_unknown_transaction_fails() {
        let store = InMemoryReplicaStore::default();
        let err = store
            .end_transaction(Uuid::new_v4(), TransactionState::Aborted, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchTransaction(_)));
    }

    #[tokio::test]
    async fn begin_transaction_is_open_until_ended() {
        let store = InMemoryReplicaStore::default();
        let txn = store.begin_transaction("lsst", 1000).await.unwrap();
        assert!(txn.is_open());
        store.end_transaction(txn.id, TransactionState::Committed, 1500).await.unwrap();
        let reloaded = store.get_transaction(txn.id).await.unwrap().unwrap();
        assert!(!reloaded.is_open());
    }

    #[test]
    fn replication_level_cache_expires_after_the_ttl() {
        let cache = ReplicationLevelCache::new();
        cache.set("lsst", 1.0, 1_000);
        assert_eq!(cache.get("lsst", 1_000), Some(1.0));
        assert_eq!(cache.get("lsst", 1_000 + REPLICATION_LEVEL_CACHE_TTL_MILLIS), Some(1.0));
        assert_eq!(cache.get("lsst", 1_000 + REPLICATION_LEVEL_CACHE_TTL_MILLIS + 1), None);
    }

    #[test]
    fn replication_level_cache_invalidate_drops_the_entry() {
        let cache = ReplicationLevelCache::new();
        cache.set("lsst", 1.0, 1_000);
        cache.invalidate("lsst");
        assert_eq!(cache.get("lsst", 1_000), None);
    }
}
