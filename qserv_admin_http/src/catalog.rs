use crate::error::AdminHttpError;
use observability_deps::tracing::debug;
use parking_lot::Mutex;
use qserv_replica::{ReplicaInfo, ReplicaStatus, ReplicaStore};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct DatabaseRecord {
    family: String,
    published: bool,
}

/// Databases and tables known to the ingest surface, and the mutex that serializes chunk
/// placement decisions across concurrent `AddChunk` calls.
#[derive(Debug, Default)]
pub struct DatabaseCatalog {
    databases: Mutex<HashMap<String, DatabaseRecord>>,
    tables: Mutex<HashMap<(String, String), ()>>,
}

impl DatabaseCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_database(&self, name: impl Into<String>, family: impl Into<String>) {
        let name = name.into();
        self.databases.lock().insert(
            name,
            DatabaseRecord {
                family: family.into(),
                published: false,
            },
        );
    }

    pub fn publish_database(&self, name: &str) -> Result<(), AdminHttpError> {
        let mut databases = self.databases.lock();
        let record = databases
            .get_mut(name)
            .ok_or_else(|| AdminHttpError::NotFound(format!("no database '{name}'")))?;
        record.published = true;
        Ok(())
    }

    pub fn add_table(&self, database: &str, table: impl Into<String>) -> Result<(), AdminHttpError> {
        if !self.databases.lock().contains_key(database) {
            return Err(AdminHttpError::NotFound(format!("no database '{database}'")));
        }
        self.tables.lock().insert((database.to_string(), table.into()), ());
        Ok(())
    }

    fn family_of(&self, database: &str) -> Result<String, AdminHttpError> {
        self.databases
            .lock()
            .get(database)
            .map(|r| r.family.clone())
            .ok_or_else(|| AdminHttpError::NotFound(format!("no database '{database}'")))
    }

    fn siblings_of(&self, database: &str, family: &str) -> Vec<String> {
        self.databases
            .lock()
            .iter()
            .filter(|(name, record)| name.as_str() != database && record.family == family)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Implements the ingest-placement algorithm: reuse an existing single replica if there is
    /// one, otherwise place on the least-loaded worker, preferring a worker that already hosts
    /// the same chunk in a sibling database of the family.
    pub async fn add_chunk(
        &self,
        database: &str,
        chunk: u32,
        candidate_workers: &[String],
        store: &dyn ReplicaStore,
        now: qserv_time::TimestampMillis,
    ) -> Result<ReplicaInfo, AdminHttpError> {
        let family = self.family_of(database)?;

        let existing = store.find_replicas(database, chunk).await?;
        if existing.len() == 1 {
            return Ok(existing.into_iter().next().expect("len checked above"));
        }

        let siblings = self.siblings_of(database, &family);
        let mut co_located_candidates = Vec::new();
        for sibling in &siblings {
            let sibling_replicas = store.find_replicas(sibling, chunk).await?;
            for replica in sibling_replicas {
                if replica.status == ReplicaStatus::Complete && !co_located_candidates.contains(&replica.worker) {
                    co_located_candidates.push(replica.worker);
                }
            }
        }

        let mut load_by_worker: HashMap<String, usize> = HashMap::new();
        for worker in candidate_workers {
            let count = store.find_replicas_by_worker(worker).await?.len();
            load_by_worker.insert(worker.clone(), count);
        }

        let pool: Vec<&String> = if !co_located_candidates.is_empty() {
            co_located_candidates
                .iter()
                .filter(|w| candidate_workers.contains(w))
                .collect()
        } else {
            candidate_workers.iter().collect()
        };

        let chosen = pool
            .into_iter()
            .min_by_key(|w| (*load_by_worker.get(w.as_str()).unwrap_or(&0), w.as_str()))
            .ok_or_else(|| AdminHttpError::BadRequest("no candidate worker available".to_string()))?
            .clone();

        let replica = ReplicaInfo::new(ReplicaStatus::Complete, chosen, database, chunk, now);
        store.record_replica(&replica).await?;
        debug!(database, chunk, worker = %replica.worker, "placed chunk");
        Ok(replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::InMemoryReplicaStore;

    #[tokio::test]
    async fn add_chunk_reuses_the_single_existing_replica() {
        let catalog = DatabaseCatalog::new();
        catalog.add_database("lsst_main", "lsst");
        let store = InMemoryReplicaStore::default();
        store
            .record_replica(&ReplicaInfo::new(ReplicaStatus::Complete, "worker-a", "lsst_main", 7, 100))
            .await
            .unwrap();

        let workers = vec!["worker-a".to_string(), "worker-b".to_string()];
        let placed = catalog.add_chunk("lsst_main", 7, &workers, &store, 200).await.unwrap();
        assert_eq!(placed.worker, "worker-a");
    }

    #[tokio::test]
    async fn add_chunk_prefers_a_sibling_co_located_worker() {
        let catalog = DatabaseCatalog::new();
        catalog.add_database("lsst_main", "lsst");
        catalog.add_database("lsst_meta", "lsst");
        let store = InMemoryReplicaStore::default();
        store
            .record_replica(&ReplicaInfo::new(ReplicaStatus::Complete, "worker-b", "lsst_meta", 3, 100))
            .await
            .unwrap();

        let workers = vec!["worker-a".to_string(), "worker-b".to_string()];
        let placed = catalog.add_chunk("lsst_main", 3, &workers, &store, 200).await.unwrap();
        assert_eq!(placed.worker, "worker-b");
    }

    #[tokio::test]
    async fn add_chunk_fails_for_an_unknown_database() {
        let catalog = DatabaseCatalog::new();
        let store = InMemoryReplicaStore::default();
        let workers = vec!["worker-a".to_string()];
        let err = catalog.add_chunk("missing", 1, &workers, &store, 100).await.unwrap_err();
        assert!(matches!(err, AdminHttpError::NotFound(_)));
    }
}
