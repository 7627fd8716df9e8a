use crate::ingest::IngestState;
use crate::router;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use observability_deps::tracing::info;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

/// Binds and serves the `/ingest/v1/*` surface on `addr` until the returned future is dropped or
/// the process is signalled to shut down.
pub async fn serve(addr: SocketAddr, state: Arc<IngestState>) -> hyper::Result<()> {
    let make_svc = make_service_fn(move |_conn| {
        let state = Arc::clone(&state);
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(router::route(&state, req).await) }
            }))
        }
    });

    info!(%addr, "admin HTTP surface listening");
    Server::bind(&addr).serve(make_svc).await
}
