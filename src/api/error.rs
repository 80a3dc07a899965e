use crate::core::StoreFailure;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unsupported ETF type '{0}', use btc, eth or sol")]
    InvalidEtfType(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid days '{0}', expected a number between 1 and 365")]
    InvalidDays(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    Store(#[from] StoreFailure),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::InvalidEtfType(_) => (StatusCode::BAD_REQUEST, "INVALID_ETF_TYPE"),
            ApiError::InvalidDate(_) => (StatusCode::BAD_REQUEST, "INVALID_DATE"),
            ApiError::InvalidDays(_) => (StatusCode::BAD_REQUEST, "INVALID_DAYS"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Store(e) => {
                error!("Store error while serving request: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR")
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code,
                message: self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::InvalidEtfType("doge".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("nothing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Store(StoreFailure::Database(rusqlite::Error::InvalidQuery))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
