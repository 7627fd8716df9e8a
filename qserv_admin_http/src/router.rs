use crate::error::AdminHttpError;
use crate::ingest::{self, AddChunkRequest, AddDatabaseRequest, AddTableRequest, BeginTransactionRequest, EndTransactionRequest, IngestState};
use hyper::{Body, Method, Request, Response, StatusCode};
use observability_deps::tracing::warn;
use uuid::Uuid;

/// Routes `/ingest/v1/*` requests to their handlers, mirroring the route table the replication
/// controller's HTTP processor dispatches on, minus the generic `/replication/v1/*` surface
/// (see [`crate::admin_api::AdminApi`]).
pub async fn route(state: &IngestState, req: Request<Body>) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let result = dispatch(state, method, &segments, req).await;
    match result {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn dispatch(
    state: &IngestState,
    method: Method,
    segments: &[&str],
    req: Request<Body>,
) -> Result<Response<Body>, AdminHttpError> {
    match (method, segments) {
        (Method::POST, ["ingest", "v1", "trans"]) => {
            let body: BeginTransactionRequest = read_json(req).await?;
            let txn = ingest::begin_transaction(state, body).await?;
            json_response(StatusCode::OK, &txn)
        }
        (Method::GET, ["ingest", "v1", "trans", id]) => {
            let id = parse_uuid(id)?;
            let txn = ingest::get_transaction(state, id).await?;
            json_response(StatusCode::OK, &txn)
        }
        (Method::PUT, ["ingest", "v1", "trans", id]) => {
            let id = parse_uuid(id)?;
            let body: EndTransactionRequest = read_json(req).await?;
            ingest::end_transaction(state, id, body).await?;
            json_response(StatusCode::OK, &serde_json::json!({"success": true}))
        }
        (Method::POST, ["ingest", "v1", "database"]) => {
            let body: AddDatabaseRequest = read_json(req).await?;
            ingest::add_database(state, body).await?;
            json_response(StatusCode::OK, &serde_json::json!({"success": true}))
        }
        (Method::PUT, ["ingest", "v1", "database", name]) => {
            ingest::publish_database(state, name).await?;
            json_response(StatusCode::OK, &serde_json::json!({"success": true}))
        }
        (Method::POST, ["ingest", "v1", "table"]) => {
            let body: AddTableRequest = read_json(req).await?;
            ingest::add_table(state, body).await?;
            json_response(StatusCode::OK, &serde_json::json!({"success": true}))
        }
        (Method::POST, ["ingest", "v1", "chunk"]) => {
            let body: AddChunkRequest = read_json(req).await?;
            let placement = ingest::add_chunk(state, body).await?;
            json_response(StatusCode::OK, &placement)
        }
        _ => {
            warn!(path = ?segments, "no route matched");
            Err(AdminHttpError::NotFound("no such route".to_string()))
        }
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, AdminHttpError> {
    Uuid::parse_str(raw).map_err(|_| AdminHttpError::BadRequest(format!("invalid id '{raw}'")))
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Body>) -> Result<T, AdminHttpError> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| AdminHttpError::BadRequest(format!("failed to read request body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| AdminHttpError::BadRequest(format!("invalid JSON body: {e}")))
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Result<Response<Body>, AdminHttpError> {
    let bytes =
        serde_json::to_vec(body).map_err(|e| AdminHttpError::Internal(format!("failed to encode response: {e}")))?;
    Ok(Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("static response parts are always valid"))
}
