/*!
The failure taxonomy every handler speaks, and its mapping onto the
uniform `{success, message}` response envelope.
*/
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::DbError;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Missing or malformed input (400).
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid, or expired credential (401).
    #[error("{0}")]
    Unauthenticated(String),
    /// Authenticated, but role/department/ownership says no (403).
    #[error("{0}")]
    Forbidden(String),
    /// Referenced record absent (404).
    #[error("{0}")]
    NotFound(String),
    /// A natural-key uniqueness constraint fired (409).
    #[error("{0}")]
    Conflict(String),
    /// Store or other infrastructure failure (500). The payload is
    /// logged, never sent to the client.
    #[error("{0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> ApiError {
        if e.is_unique_violation() {
            ApiError::Conflict(
                "A record with the same key was created concurrently. Retry as an update.".to_owned()
            )
        } else {
            ApiError::Unexpected(e.display().to_owned())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let message = match &self {
            ApiError::Unexpected(detail) => {
                log::error!("Internal error fielding request: {}", detail);
                "An unexpected error occurred.".to_owned()
            },
            other => other.to_string(),
        };

        (
            code,
            Json(json!({ "success": false, "message": message })),
        ).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthenticated("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Unexpected("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_violations_surface_as_conflict() {
        let e = DbError::unique_violation_for_test();
        match ApiError::from(e) {
            ApiError::Conflict(_) => {},
            other => panic!("expected Conflict, got {:?}", other),
        }

        let e = DbError::from("connection refused".to_owned());
        match ApiError::from(e) {
            ApiError::Unexpected(_) => {},
            other => panic!("expected Unexpected, got {:?}", other),
        }
    }
}
