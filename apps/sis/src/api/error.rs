//! # Error Responses
//!
//! Maps [`SisError`] onto HTTP responses so handlers can use `?`.

use super::html;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sis_core::SisError;

/// Error returned by portal handlers.
#[derive(Debug)]
pub enum ApiError {
    Sis(SisError),
    /// Malformed query parameters.
    BadRequest(String),
}

impl From<SisError> for ApiError {
    fn from(e: SisError) -> Self {
        Self::Sis(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sis(SisError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Sis(SisError::Forbidden(_)) => StatusCode::FORBIDDEN,
            Self::Sis(SisError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Sis(SisError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            Self::Sis(
                SisError::HashError(_) | SisError::IoError(_) | SisError::SerializationError(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) => message.clone(),
            Self::Sis(SisError::NotFound(what)) => format!("{} not found", what),
            Self::Sis(SisError::Forbidden(message)) => message.clone(),
            Self::Sis(e @ (SisError::Validation(_) | SisError::InvalidCredentials)) => {
                e.to_string()
            }
            Self::Sis(e) => {
                tracing::error!(error = %e, "Request failed");
                "Internal server error".to_string()
            }
        };
        let body = format!("<p class=\"error\">{}</p>", html::escape(&message));
        (status, html::page(status.canonical_reason().unwrap_or("Error"), None, &[], &body))
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::from(SisError::NotFound("Course")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SisError::not_authorized()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(SisError::field("email", "bad")).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(SisError::IoError("disk".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::BadRequest("bad date".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
