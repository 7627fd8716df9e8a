use hyper::StatusCode;

/// Error surfaced by an ingest handler, carrying the HTTP status it maps to.
#[derive(Debug, thiserror::Error)]
pub enum AdminHttpError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdminHttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<qserv_replica::StoreError> for AdminHttpError {
    fn from(err: qserv_replica::StoreError) -> Self {
        match err {
            qserv_replica::StoreError::NoSuchTransaction(id) => {
                Self::NotFound(format!("no transaction with id {id}"))
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(serde::Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl AdminHttpError {
    pub fn into_response(self) -> hyper::Response<hyper::Body> {
        let status = self.status();
        let body = serde_json::to_vec(&ErrorBody {
            error: &self.to_string(),
        })
        .unwrap_or_default();
        hyper::Response::builder()
            .status(status)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(hyper::Body::from(body))
            .expect("static response parts are always valid")
    }
}
