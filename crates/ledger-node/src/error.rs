use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ledger_core::LedgerError;
use serde_json::json;
use tracing::error;

/// Error returned by handlers: a status code and a message rendered as
/// `{"success": false, "error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::Validation(_) | LedgerError::Range { .. } | LedgerError::EmptyPool => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::Busy | LedgerError::Cancelled => StatusCode::CONFLICT,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::Linkage { .. } | LedgerError::Index { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        LedgerError::NonceSpaceExhausted
        | LedgerError::Storage(_)
        | LedgerError::Corrupt(_)
        | LedgerError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::new(status_for(&err), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

/// `Json` whose rejections use the `{"success": false, ...}` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejections use the `{"success": false, ...}` body.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("request failed: {}", self.message);
        }
        let body = Json(json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}
