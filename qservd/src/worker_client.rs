use futures::{SinkExt, StreamExt};
use observability_deps::tracing::debug;
use qserv_config::Configuration;
use qserv_proto::{Frame, FrameCodec, FrameKind, Request, Response};
use qserv_replica::{ControllerError, WorkerClient};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

/// Sends replication-control requests to a worker's service port over the length-framed wire
/// protocol, resolving the worker's address from the cluster configuration on every call.
#[derive(Debug)]
pub struct TcpWorkerClient {
    configuration: Arc<Configuration>,
}

impl TcpWorkerClient {
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self { configuration }
    }
}

#[async_trait::async_trait]
impl WorkerClient for TcpWorkerClient {
    async fn send(&self, worker: &str, request: Request) -> Result<Response, ControllerError> {
        let worker_config = self.configuration.worker(worker).ok_or_else(|| ControllerError::WorkerRejected {
            worker: worker.to_string(),
            reason: "no such worker in the cluster configuration".to_string(),
        })?;
        let addr = format!("{}:{}", worker_config.svc_host, worker_config.svc_port);

        let stream = TcpStream::connect(&addr).await.map_err(|e| ControllerError::Transport {
            worker: worker.to_string(),
            source: Box::new(e),
        })?;
        let mut framed = Framed::new(stream, FrameCodec);

        let body = serde_json::to_value(&request).expect("Request always serializes");
        framed
            .send(Frame {
                kind: FrameKind::Request,
                body,
            })
            .await
            .map_err(|e| ControllerError::Transport {
                worker: worker.to_string(),
                source: Box::new(e),
            })?;

        loop {
            let frame = framed
                .next()
                .await
                .ok_or_else(|| ControllerError::Transport {
                    worker: worker.to_string(),
                    source: Box::new(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed before a response arrived",
                    )),
                })?
                .map_err(|e| ControllerError::Transport {
                    worker: worker.to_string(),
                    source: Box::new(e),
                })?;

            match frame.kind {
                FrameKind::Queued => {
                    debug!(%worker, request_id = %request.id, "request queued on worker, waiting for result");
                    continue;
                }
                FrameKind::Request | FrameKind::Service => {
                    let response: Response =
                        serde_json::from_value(frame.body).map_err(|e| ControllerError::Transport {
                            worker: worker.to_string(),
                            source: Box::new(e),
                        })?;
                    return Ok(response);
                }
            }
        }
    }
}
