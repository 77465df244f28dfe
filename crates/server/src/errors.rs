use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::types::ErrorBody;
use service::storage::remote::STORAGE_ERROR_HEADER;
use service::StorageError;
use thiserror::Error;
use tracing::{error, warn};

/// Error returned by storage handlers, rendered as `{"err": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(e) if e.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Value of the `x-storage-error` header.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Storage(e) => e.kind(),
            ApiError::BadRequest(_) => "bad_request",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = self.to_string();
        if status.is_server_error() {
            error!(%status, error = %msg, "storage request failed");
        } else {
            warn!(%status, error = %msg, "storage request rejected");
        }
        (status, [(STORAGE_ERROR_HEADER, self.kind())], Json(ErrorBody::new(msg))).into_response()
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("storage backend failed to start: {0}")]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_storage_errors_to_statuses() {
        assert_eq!(ApiError::from(StorageError::NotFound("k".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(StorageError::InvalidScope("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(StorageError::InvalidValue("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(StorageError::InvalidKey("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(StorageError::unavailable("down")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::BadRequest("no".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_carries_error_kind_header() {
        let resp = ApiError::from(StorageError::NotFound("k".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get(STORAGE_ERROR_HEADER).unwrap(), "not_found");
    }

    #[test]
    fn message_is_passed_through() {
        let err = ApiError::from(StorageError::unavailable("replica down"));
        assert_eq!(err.to_string(), "replica down");
    }
}
