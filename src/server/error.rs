use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Map an error to its status and JSON body. Upstream detail is only exposed in development.
pub fn map_error(err: &AppError, development: bool) -> (StatusCode, Json<ErrorEnvelope>) {
    let (status, code) = match err {
        AppError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        AppError::Auth(AuthError::MissingToken) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        AppError::Auth(AuthError::InvalidToken) => (StatusCode::FORBIDDEN, "forbidden"),
        AppError::Auth(AuthError::ExchangeFailed) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "auth_failed")
        }
        AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
        AppError::Fetch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "fetch_failed"),
        AppError::Ai { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "ai_failed"),
        AppError::Pr { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "pr_failed"),
        AppError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        AppError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    let detail = if development {
        err.detail().map(str::to_string)
    } else {
        None
    };

    (
        status,
        Json(ErrorEnvelope {
            code,
            error: err.to_string(),
            detail,
        }),
    )
}

pub fn error_response(err: &AppError, development: bool) -> Response {
    map_error(err, development).into_response()
}

pub fn respond<T: Serialize>(result: Result<T, AppError>, development: bool) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(err) => error_response(&err, development),
    }
}

/// Turn an axum JSON extraction failure into a validation error.
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected request body");
            Err(AppError::validation("Invalid JSON request body"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::validation("x"), StatusCode::BAD_REQUEST),
            (AppError::from(AuthError::MissingToken), StatusCode::UNAUTHORIZED),
            (AppError::from(AuthError::InvalidToken), StatusCode::FORBIDDEN),
            (AppError::from(AuthError::ExchangeFailed), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Config("x".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::NotFound, StatusCode::NOT_FOUND),
        ];
        for (err, expected) in cases {
            assert_eq!(map_error(&err, false).0, expected, "{err:?}");
        }
    }

    #[test]
    fn test_detail_only_in_development() {
        let err = AppError::pr("Failed to create pull request", "422 Validation Failed");
        let (_, Json(prod)) = map_error(&err, false);
        assert_eq!(prod.error, "Failed to create pull request");
        assert!(prod.detail.is_none());

        let (_, Json(dev)) = map_error(&err, true);
        assert_eq!(dev.detail.as_deref(), Some("422 Validation Failed"));
        assert_eq!(dev.code, "pr_failed");
    }
}
