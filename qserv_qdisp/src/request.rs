use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use observability_deps::tracing::{debug, warn};
use qserv_proto::{CodecError, Frame, FrameCodec, FrameKind, Request, RequestPayload, RequestType, Response};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::codec::Framed;

/// How long to wait between re-querying a worker for the status of a request that's still
/// [`qserv_proto::ResponseStatus::InProgress`] or [`qserv_proto::ResponseStatus::IsCancelling`].
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on status re-queries for a single request, so a worker that never reaches a
/// terminal status can't wedge the dispatcher forever.
const MAX_STATUS_POLLS: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("transport error: {0}")]
    Codec(#[from] CodecError),
    #[error("connection closed by worker before a response arrived")]
    ConnectionClosed,
    #[error("frame body was not a response: {0:?}")]
    UnexpectedFrame(FrameKind),
}

/// Sends a [`Request`] to a worker and returns its [`Response`], abstracted so the dispatch
/// layer can be exercised without a live worker connection.
#[async_trait]
pub trait Messenger: std::fmt::Debug + Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, MessengerError>;
}

/// Sends requests over a single worker TCP connection, one at a time.
#[derive(Debug)]
pub struct TcpMessenger {
    addr: String,
}

impl TcpMessenger {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Opens a fresh connection, sends one request, and returns the response it gets back.
    /// Used both for the initial request and for each STATUS re-query, since each connects and
    /// closes independently.
    async fn send_once(&self, request: &Request) -> Result<Response, MessengerError> {
        let stream = TcpStream::connect(&self.addr).await.map_err(CodecError::Io)?;
        let mut framed = Framed::new(stream, FrameCodec);

        let body = serde_json::to_value(request).expect("Request always serializes");
        framed
            .send(Frame {
                kind: FrameKind::Request,
                body,
            })
            .await?;

        loop {
            let frame = framed.next().await.ok_or(MessengerError::ConnectionClosed)??;
            match frame.kind {
                FrameKind::Queued => {
                    debug!(request_id = %request.id, "request queued on worker, waiting for result");
                    continue;
                }
                FrameKind::Request => {
                    let response: Response = serde_json::from_value(frame.body)?;
                    return Ok(response);
                }
                FrameKind::Service => {
                    warn!(request_id = %request.id, "ignoring unrelated service frame");
                    continue;
                }
            }
        }
    }
}

#[async_trait]
impl Messenger for TcpMessenger {
    async fn send(&self, request: Request) -> Result<Response, MessengerError> {
        let mut response = self.send_once(&request).await?;

        let mut polls = 0;
        while !response.status.is_terminal() && polls < MAX_STATUS_POLLS {
            debug!(
                request_id = %request.id,
                status = ?response.status,
                polls,
                "request not yet terminal, re-querying status"
            );
            sleep(STATUS_POLL_INTERVAL).await;
            let status_request = Request {
                id: format!("{}-status-{polls}", request.id),
                request_type: RequestType::Status,
                priority: request.priority,
                payload: RequestPayload::Status {
                    id: request.id.clone(),
                    allow_duplicate: true,
                },
            };
            response = self.send_once(&status_request).await?;
            polls += 1;
        }
        Ok(response)
    }
}

impl From<serde_json::Error> for MessengerError {
    fn from(e: serde_json::Error) -> Self {
        MessengerError::Codec(CodecError::Deserialize(e))
    }
}

/// Test-only messenger shared with [`crate::executive`]'s tests, kept `pub(crate)` rather than
/// behind the usual unit-test module privacy so both can exercise dispatch without a socket.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use qserv_proto::{ExtendedStatus, Performance, RequestPayload, RequestType, ResponsePayload, ResponseStatus};
    use std::sync::Mutex;

    /// Records every request it's handed and replies with a fixed response, for exercising the
    /// executive and job-query machinery without a socket. The first `fail_connections` calls
    /// return [`MessengerError::ConnectionClosed`] instead, to exercise retry.
    #[derive(Debug, Default)]
    pub struct MockMessenger {
        pub sent: Mutex<Vec<Request>>,
        pub reply_status: ResponseStatus,
        pub fail_connections: usize,
    }

    #[async_trait]
    impl Messenger for MockMessenger {
        async fn send(&self, request: Request) -> Result<Response, MessengerError> {
            let id = request.id.clone();
            let attempt = self.sent.lock().unwrap().len();
            self.sent.lock().unwrap().push(request);
            if attempt < self.fail_connections {
                return Err(MessengerError::ConnectionClosed);
            }
            Ok(Response {
                id,
                status: self.reply_status,
                extended_status: ExtendedStatus::None,
                performance: Performance::default(),
                payload: Some(ResponsePayload::Rows { row_count: 0 }),
            })
        }
    }

    #[tokio::test]
    async fn mock_messenger_records_the_request_and_echoes_its_id() {
        let mock = MockMessenger {
            reply_status: ResponseStatus::Success,
            ..Default::default()
        };
        let req = Request {
            id: "job-1".to_string(),
            request_type: RequestType::Sql,
            priority: 0,
            payload: RequestPayload::Sql {
                chunk_query_spec: "SELECT 1".to_string(),
            },
        };
        let resp = mock.send(req).await.unwrap();
        assert_eq!(resp.id, "job-1");
        assert_eq!(resp.status, ResponseStatus::Success);
        assert_eq!(mock.sent.lock().unwrap().len(), 1);
    }
}
