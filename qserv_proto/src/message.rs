use qserv_time::TimestampMillis;
use serde::{Deserialize, Serialize};

/// The three message shapes that cross the dispatch<->worker wire, matching the header a worker
/// sends back on an established connection before a request has been fully answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameKind {
    /// A new request queued on the worker side, not yet picked up by a processing thread.
    Queued,
    /// A request body sent from the dispatcher to a worker.
    Request,
    /// A worker-originated control message unrelated to any single request (e.g. service
    /// suspend/resume).
    Service,
}

/// What kind of work a [`Request`] body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    ReplicaCreate,
    ReplicaDelete,
    ReplicaFind,
    ReplicaFindAll,
    TestEcho,
    Sql,
    /// Asks the worker for the current state of a previously submitted request, identified by
    /// its id carried in [`RequestPayload::Status`]. Used to re-poll a request that came back
    /// [`ResponseStatus::InProgress`] or [`ResponseStatus::IsCancelling`] instead of opening a
    /// new connection for it.
    Status,
}

/// Coarse outcome reported in every [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResponseStatus {
    #[default]
    Queued,
    Success,
    InProgress,
    IsCancelling,
    Bad,
    Failed,
    Cancelled,
}

impl ResponseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResponseStatus::Success
                | ResponseStatus::Bad
                | ResponseStatus::Failed
                | ResponseStatus::Cancelled
        )
    }
}

/// Finer-grained reason attached to a non-[`ResponseStatus::Success`] outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtendedStatus {
    None,
    InvalidParam,
    DuplicateKey,
    NoSuchFile,
    FileExists,
    SpaceExceeded,
    FileRead,
    FileWrite,
    ChunkInUse,
    NoSuchChunk,
    NoSuchDatabase,
    NoSuchTable,
}

/// When each stage of a request's lifecycle was reached, for latency accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Performance {
    pub receive_time: Option<TimestampMillis>,
    pub start_time: Option<TimestampMillis>,
    pub finish_time: Option<TimestampMillis>,
}

impl Performance {
    pub fn elapsed_millis(&self) -> Option<i64> {
        Some(self.finish_time? - self.start_time?)
    }
}

/// A request body sent from the dispatcher (or replication controller) to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub request_type: RequestType,
    pub priority: i32,
    pub payload: RequestPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestPayload {
    Sql { chunk_query_spec: String },
    ReplicaCreate { database: String, chunk: u32 },
    ReplicaDelete { database: String, chunk: u32 },
    ReplicaFind { database: String, chunk: u32 },
    ReplicaFindAll { database: String },
    Echo { data: String },
    /// Re-queries the status of the request named by `id`. `allow_duplicate` mirrors the
    /// original protocol's flag of the same name: when set, the worker answers from its
    /// duplicate-request cache instead of rejecting the re-query as a collision.
    Status { id: String, allow_duplicate: bool },
}

/// The response body a worker sends back for a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub status: ResponseStatus,
    pub extended_status: ExtendedStatus,
    pub performance: Performance,
    pub payload: Option<ResponsePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Rows { row_count: u64 },
    ReplicaInfo {
        chunk: u32,
        checksum: Option<String>,
        /// Whether this chunk's replica is co-located with every other table the database
        /// requires to be on the same worker.
        co_located: bool,
    },
    Echo { data: String },
    Error { message: String },
}

/// A frame as it crosses the wire: a [`FrameKind`] tag plus the JSON-encoded body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_status_terminal_set_is_success_bad_failed_cancelled() {
        assert!(ResponseStatus::Success.is_terminal());
        assert!(ResponseStatus::Cancelled.is_terminal());
        assert!(!ResponseStatus::Queued.is_terminal());
        assert!(!ResponseStatus::InProgress.is_terminal());
        assert!(!ResponseStatus::IsCancelling.is_terminal());
    }

    #[test]
    fn performance_elapsed_requires_both_ends() {
        let mut p = Performance::default();
        assert!(p.elapsed_millis().is_none());
        p.start_time = Some(100);
        p.finish_time = Some(150);
        assert_eq!(p.elapsed_millis(), Some(50));
    }
}
