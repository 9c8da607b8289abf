//! Error types for the viewer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. A
//! failure only ever affects the request that hit it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use occupancy_db::DbError;
use occupancy_types::UnknownDay;

/// Errors that can occur in the viewer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An invalid path or query parameter was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Reading from storage failed.
    #[error("storage read failed: {0}")]
    StorageRead(#[from] DbError),
}

impl From<UnknownDay> for ObserverError {
    fn from(e: UnknownDay) -> Self {
        Self::InvalidQuery(e.to_string())
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::InvalidQuery(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::StorageRead(e) => {
                tracing::warn!(error = %e, "storage read failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
