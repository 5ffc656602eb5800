use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vodpack_core::error::{ApiError, ErrorEnvelope};
use vodpack_db::DbError;
use vodpack_ingest::IngestError;

/// Newtype wrapper so we can implement `IntoResponse` in this crate.
#[derive(Debug)]
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope::from(&self.0);
        (status, Json(envelope)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        let message = e.public_message().to_string();
        match e {
            IngestError::NoFile => Self(ApiError::BadRequest(message)),
            _ => Self(ApiError::Internal(message)),
        }
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        tracing::error!(error = %e, "catalog query failed");
        Self(ApiError::Internal("catalog unavailable".into()))
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self(ApiError::PayloadTooLarge("upload exceeds size limit".into()))
        } else {
            Self(ApiError::BadRequest(format!("invalid multipart body: {}", e.body_text())))
        }
    }
}
