//! Rejection taxonomy for form submissions and its HTTP mapping.

use crate::notify::DispatchError;
use crate::submission::FormKind;
use crate::subscription::StoreError;
use crate::token::TokenError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("dispatch failed: {0}")]
    DispatchFailed(#[from] DispatchError),
    #[error("subscription not recorded: {0}")]
    StoreFailed(#[from] StoreError),
    #[error("confirmation token not issued: {0}")]
    Token(#[from] TokenError),
}

impl SubmissionError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MalformedBody(_)
            | Self::DispatchFailed(_)
            | Self::StoreFailed(_)
            | Self::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing response. Internal failures are logged here in full and
    /// answered with a fixed message.
    pub fn into_response_for(self, kind: FormKind) -> Response {
        let status = self.status();
        let body = match self {
            Self::MethodNotAllowed => json!({ "error": "Method not allowed" }),
            Self::RateLimited => json!({
                "error": "Too many requests. Please try again later.",
                "message": "Rate limit exceeded"
            }),
            Self::ValidationFailed(errors) => json!({
                "error": "Validation failed",
                "errors": errors
            }),
            Self::PayloadTooLarge => json!({
                "error": "Payload too large",
                "message": kind.failure_message()
            }),
            internal => {
                error!(form = kind.name(), "Submission failed: {}", internal);
                json!({
                    "error": "Internal server error",
                    "message": kind.failure_message()
                })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(SubmissionError::MethodNotAllowed.status(), 405);
        assert_eq!(SubmissionError::RateLimited.status(), 429);
        assert_eq!(SubmissionError::ValidationFailed(vec![]).status(), 400);
        assert_eq!(SubmissionError::PayloadTooLarge.status(), 413);
        assert_eq!(SubmissionError::MalformedBody("eof".into()).status(), 500);
        assert_eq!(
            SubmissionError::DispatchFailed(DispatchError::Other("x".into())).status(),
            500
        );
        assert_eq!(SubmissionError::Token(TokenError::InvalidKey).status(), 500);
    }

    #[test]
    fn display_lists_validation_errors() {
        let err = SubmissionError::ValidationFailed(vec![
            "Name is required".into(),
            "Spam detected".into(),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: Name is required; Spam detected"
        );
    }
}
