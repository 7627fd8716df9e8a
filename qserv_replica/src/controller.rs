use async_trait::async_trait;
use observability_deps::tracing::debug;
use parking_lot::Mutex;
use qserv_proto::{Request, RequestPayload, RequestType, Response};
use qserv_time::{TimeProviderRef, TimestampMillis};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("worker {worker} rejected request: {reason}")]
    WorkerRejected { worker: String, reason: String },
    #[error("transport error talking to worker {worker}: {source}")]
    Transport {
        worker: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Sends a replication-control-plane [`Request`] to a named worker. Distinct from
/// [`qserv_qdisp::Messenger`](../../qserv_qdisp/trait.Messenger.html): that one carries query
/// dispatch traffic for the czar, this one carries the much smaller replica
/// create/delete/find/find-all traffic the controller issues.
#[async_trait]
pub trait WorkerClient: std::fmt::Debug + Send + Sync {
    async fn send(&self, worker: &str, request: Request) -> Result<Response, ControllerError>;
}

/// Identifies one running controller instance, so workers and the audit log can tell which
/// controller process issued a given request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerIdentity {
    pub id: Uuid,
    pub host: String,
    pub pid: u32,
}

impl ControllerIdentity {
    pub fn new(host: impl Into<String>, pid: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: host.into(),
            pid,
        }
    }
}

/// Issues replica create/delete/find/find-all requests to workers on behalf of the replication
/// jobs, and keeps a registry of requests currently in flight.
#[derive(Debug)]
pub struct Controller {
    identity: ControllerIdentity,
    client: Arc<dyn WorkerClient>,
    time_provider: TimeProviderRef,
    in_flight: Mutex<HashMap<String, Request>>,
}

impl Controller {
    pub fn new(identity: ControllerIdentity, client: Arc<dyn WorkerClient>, time_provider: TimeProviderRef) -> Self {
        Self {
            identity,
            client,
            time_provider,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &ControllerIdentity {
        &self.identity
    }

    pub fn now_millis(&self) -> TimestampMillis {
        use qserv_time::TimeProvider;
        self.time_provider.now_millis()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Records this controller's identity in `store` so concurrently running controllers, and
    /// the jobs each one launches, can be told apart. Call once at startup.
    pub async fn register(&self, store: &dyn crate::store::ReplicaStore) -> Result<(), crate::store::StoreError> {
        store
            .register_controller(self.identity.id, &self.identity.host, self.identity.pid, self.now_millis())
            .await
    }

    async fn dispatch(&self, worker: &str, request: Request) -> Result<Response, ControllerError> {
        self.in_flight.lock().insert(request.id.clone(), request.clone());
        debug!(worker, request_id = %request.id, request_type = ?request.request_type, "controller dispatching request");
        let result = self.client.send(worker, request.clone()).await;
        self.in_flight.lock().remove(&request.id);
        result
    }

    pub async fn replica_create(&self, worker: &str, database: &str, chunk: u32) -> Result<Response, ControllerError> {
        self.dispatch(
            worker,
            Request {
                id: Uuid::new_v4().to_string(),
                request_type: RequestType::ReplicaCreate,
                priority: 0,
                payload: RequestPayload::ReplicaCreate {
                    database: database.to_string(),
                    chunk,
                },
            },
        )
        .await
    }

    pub async fn replica_delete(&self, worker: &str, database: &str, chunk: u32) -> Result<Response, ControllerError> {
        self.dispatch(
            worker,
            Request {
                id: Uuid::new_v4().to_string(),
                request_type: RequestType::ReplicaDelete,
                priority: 0,
                payload: RequestPayload::ReplicaDelete {
                    database: database.to_string(),
                    chunk,
                },
            },
        )
        .await
    }

    pub async fn replica_find(&self, worker: &str, database: &str, chunk: u32) -> Result<Response, ControllerError> {
        self.dispatch(
            worker,
            Request {
                id: Uuid::new_v4().to_string(),
                request_type: RequestType::ReplicaFind,
                priority: 0,
                payload: RequestPayload::ReplicaFind {
                    database: database.to_string(),
                    chunk,
                },
            },
        )
        .await
    }

    pub async fn replica_find_all(&self, worker: &str, database: &str) -> Result<Response, ControllerError> {
        self.dispatch(
            worker,
            Request {
                id: Uuid::new_v4().to_string(),
                request_type: RequestType::ReplicaFindAll,
                priority: 0,
                payload: RequestPayload::ReplicaFindAll {
                    database: database.to_string(),
                },
            },
        )
        .await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use qserv_proto::{ExtendedStatus, Performance, ResponsePayload, ResponseStatus};
    use std::sync::Mutex as StdMutex;

    /// Records every `(worker, request)` pair it's handed and always replies success, for
    /// exercising jobs and the controller without a live worker.
    #[derive(Debug, Default)]
    pub struct MockWorkerClient {
        pub sent: StdMutex<Vec<(String, Request)>>,
    }

    #[async_trait]
    impl WorkerClient for MockWorkerClient {
        async fn send(&self, worker: &str, request: Request) -> Result<Response, ControllerError> {
            let id = request.id.clone();
            let chunk = match &request.payload {
                RequestPayload::ReplicaCreate { chunk, .. }
                | RequestPayload::ReplicaDelete { chunk, .. }
                | RequestPayload::ReplicaFind { chunk, .. } => *chunk,
                _ => 0,
            };
            self.sent.lock().unwrap().push((worker.to_string(), request));
            Ok(Response {
                id,
                status: ResponseStatus::Success,
                extended_status: ExtendedStatus::None,
                performance: Performance::default(),
                payload: Some(ResponsePayload::ReplicaInfo {
                    chunk,
                    checksum: None,
                    co_located: false,
                }),
            })
        }
    }
}
