// Error handling types for the API
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Message shown to end users when a sign-in attempt fails.
pub const SIGN_IN_FAILED_MESSAGE: &str = "Unable to sign in at this time";

/// Structured error kind, stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorKind {
    MissingCredential,
    Forbidden,
    InvalidResponse,
    BadRequest,
    Unauthorized,
    Conflict,
    Internal,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorKind::MissingCredential => "MISSING_CREDENTIAL",
            AuthErrorKind::Forbidden => "FORBIDDEN",
            AuthErrorKind::InvalidResponse => "INVALID_RESPONSE",
            AuthErrorKind::BadRequest => "BAD_REQUEST",
            AuthErrorKind::Unauthorized => "UNAUTHORIZED",
            AuthErrorKind::Conflict => "CONFLICT",
            AuthErrorKind::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthErrorKind::MissingCredential | AuthErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            AuthErrorKind::Forbidden => StatusCode::FORBIDDEN,
            AuthErrorKind::InvalidResponse => StatusCode::BAD_GATEWAY,
            AuthErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthErrorKind::Conflict => StatusCode::CONFLICT,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Authentication and session errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MissingCredential(_) => AuthErrorKind::MissingCredential,
            AuthError::Forbidden(_) => AuthErrorKind::Forbidden,
            AuthError::InvalidResponse(_) => AuthErrorKind::InvalidResponse,
            AuthError::BadRequest(_) => AuthErrorKind::BadRequest,
            AuthError::Unauthorized(_) => AuthErrorKind::Unauthorized,
            AuthError::Conflict(_) => AuthErrorKind::Conflict,
            AuthError::Internal(_) => AuthErrorKind::Internal,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthError::MissingCredential(msg)
            | AuthError::Forbidden(msg)
            | AuthError::InvalidResponse(msg)
            | AuthError::BadRequest(msg)
            | AuthError::Unauthorized(msg)
            | AuthError::Conflict(msg)
            | AuthError::Internal(msg) => msg,
        }
    }

    pub fn missing_token() -> Self {
        AuthError::Unauthorized("Missing token".to_string())
    }

    pub fn token_expired() -> Self {
        AuthError::Unauthorized("Token expired".to_string())
    }

    pub fn invalid_token() -> Self {
        AuthError::Unauthorized("Invalid token".to_string())
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.kind();
        // Session errors keep their message so clients can react to "Token expired";
        // everything else is collapsed to the generic sign-in failure.
        let message = match &self {
            AuthError::Unauthorized(_) => self.message().to_string(),
            AuthError::Internal(msg) => {
                error!(error = %msg, "Internal error surfaced to client");
                SIGN_IN_FAILED_MESSAGE.to_string()
            }
            _ => SIGN_IN_FAILED_MESSAGE.to_string(),
        };

        let error_response = ErrorResponse {
            error: message,
            code: kind.as_str().to_string(),
        };

        (kind.status(), Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn render(err: AuthError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            AuthError::MissingCredential("x".into()).kind(),
            AuthErrorKind::MissingCredential
        );
        assert_eq!(AuthError::token_expired().kind(), AuthErrorKind::Unauthorized);
        assert_eq!(AuthError::token_expired().message(), "Token expired");
        assert_eq!(AuthError::token_expired().to_string(), "Token expired");
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_message() {
        let (status, body) = render(AuthError::token_expired()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Token expired");
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_sign_in_failures_are_generic() {
        let (status, body) = render(AuthError::Forbidden("audience mismatch".into())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], SIGN_IN_FAILED_MESSAGE);
        assert_eq!(body["code"], "FORBIDDEN");

        let (status, body) = render(AuthError::BadRequest("no email".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, body) = render(AuthError::Internal("jwt error".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], SIGN_IN_FAILED_MESSAGE);
    }
}
