use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::web::ApiMessage;

const PG_UNIQUE_VIOLATION: &str = "23505";

/// Request-level failure surfaced to API clients as `{ "message": ... }`.
///
/// Every variant except `Unauthorized`, `Forbidden` and `Internal` maps to
/// 400 so that clients only have to branch on the message text.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Conflict(String),
    NotFound(String),
    Auth(String),
    Expired(String),
    Unauthorized,
    Forbidden(String),
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        ApiError::Auth(message.into())
    }

    pub fn expired(message: impl Into<String>) -> Self {
        ApiError::Expired(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn internal(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(message) => {
                warn!(%message, "rejected request: invalid input");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Conflict(message) => {
                warn!(%message, "rejected request: duplicate record");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::NotFound(message) => {
                info!(%message, "rejected request: record missing");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Auth(message) => {
                warn!(%message, "rejected request: authentication failed");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Expired(message) => {
                warn!(%message, "rejected request: credential expired");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Unauthorized => {
                warn!("rejected request: missing or invalid session");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            ApiError::Forbidden(message) => {
                warn!(%message, "rejected request: not the owner");
                (StatusCode::FORBIDDEN, message)
            }
            ApiError::Internal(err) => {
                error!(?err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err}"))
            }
        };

        (status, Json(ApiMessage::new(message))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

/// True when a database write bounced off a unique constraint. Callers use
/// this to turn raced duplicate inserts into the same conflict message the
/// pre-insert existence check produces.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(PG_UNIQUE_VIOLATION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn maps_domain_failures_to_bad_request() {
        for err in [
            ApiError::validation("All fields are required"),
            ApiError::conflict("User already exists"),
            ApiError::not_found("User does not exist"),
            ApiError::auth("Invalid credentials"),
            ApiError::expired("OTP expired"),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn row_not_found_is_not_a_unique_violation() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn maps_session_and_ownership_failures_to_distinct_statuses() {
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::forbidden("You do not own this subject")
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::internal(anyhow!("connection reset"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
