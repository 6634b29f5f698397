//! Error types.
//!
//! Library code returns [`ReportError`]; HTTP handlers map everything to
//! [`ApiError`], which renders as `{"error": ..., "status": ...}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures while producing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report rendering cancelled after {pages} page(s)")]
    Cancelled { pages: usize },

    #[error("no usable fonts found (searched: {searched})")]
    FontsUnavailable { searched: String },

    #[error("PDF rendering failed: {0}")]
    Pdf(#[from] genpdf::error::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// The detection backend could not be reached or answered garbage.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Report(ReportError::FontsUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Report(_) | ApiError::Storage(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Upstream(msg) => {
                tracing::warn!(error = %msg, "Detection backend error");
                "Detection backend unavailable".to_string()
            }
            ApiError::Report(e @ ReportError::FontsUnavailable { .. }) => {
                tracing::error!(error = %e, "PDF output unavailable");
                "PDF rendering unavailable: no fonts installed".to_string()
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Upstream("down".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::from(ReportError::FontsUnavailable {
                searched: "/nowhere".into()
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(ReportError::Cancelled { pages: 3 }).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_cancelled_message() {
        let err = ReportError::Cancelled { pages: 2 };
        assert_eq!(err.to_string(), "report rendering cancelled after 2 page(s)");
    }
}
