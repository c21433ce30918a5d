use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use steakpie_core::CoreError;
use thiserror::Error;

/// Every way the webhook endpoint can refuse a request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Internal(#[from] CoreError),
}

impl AppError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// GitHub's default delivery format is form-encoded; only JSON is accepted.
    pub fn form_encoded() -> Self {
        Self::UnsupportedMediaType(
            "form-encoded payloads are not supported; set the webhook content type to application/json"
                .to_string(),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "webhook handling failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, body).into_response()
    }
}
