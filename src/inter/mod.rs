/*!
Interoperation between the client and the server.

(Not the application and the database; that's covered by `store`.)

The two middleware functions here are the outer gates every protected
route runs behind: `identify` turns the bearer token into an
[`Identity`] request extension, and `require_approved` is the status
gate keeping pending/rejected accounts out. Role gates are per-verb and
live in the handlers, which consult `policy` directly.
*/
use std::sync::Arc;

use axum::{
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

use crate::{
    auth::Identity,
    config::Glob,
    error::ApiError,
    policy,
    DATE_FMT,
};

pub mod assignments;
pub mod attendance;
pub mod auth;
pub mod dashboard;
pub mod exams;
pub mod leave;
pub mod notifications;
pub mod results;
pub mod timetable;
pub mod users;

pub fn respond_ok(body: serde_json::Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn respond_created(body: serde_json::Value) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn fmt_date(d: Date) -> String {
    d.format(DATE_FMT).unwrap_or_else(|_| d.to_string())
}

pub fn fmt_when(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_else(|_| t.to_string())
}

/// Parse a `YYYY-MM-DD` wire date, naming the offending field in the
/// failure.
pub fn parse_wire_date(s: &str, what: &str) -> Result<Date, ApiError> {
    Date::parse(s, DATE_FMT).map_err(|_| ApiError::Validation(format!(
        "{} must be a valid YYYY-MM-DD date.", what
    )))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    if token.is_empty() { None } else { Some(token) }
}

/// Middleware: resolve the bearer token into an [`Identity`] and stash
/// it in the request extensions for the handlers downstream.
pub async fn identify<B>(mut req: Request<B>, next: Next<B>) -> Response {
    let glob: Arc<Glob> = match req.extensions().get::<Arc<Glob>>() {
        Some(g) => g.clone(),
        None => {
            log::error!("Glob extension missing from request.");
            return ApiError::Unexpected(
                "Global state missing from request.".to_owned()
            ).into_response();
        },
    };

    let token = match bearer_token(req.headers()) {
        Some(t) => t.to_owned(),
        None => {
            return ApiError::Unauthenticated(
                "No token provided. Access denied.".to_owned()
            ).into_response();
        },
    };

    match crate::auth::resolve(&token, &glob.cfg.jwt_secret, &glob.store).await {
        Ok(ident) => {
            req.extensions_mut().insert(ident);
            next.run(req).await
        },
        Err(e) => e.into_response(),
    }
}

/// Middleware: the status gate. The sentinel admin always passes; a
/// non-approved account gets a 403 naming its actual status.
pub async fn require_approved<B>(req: Request<B>, next: Next<B>) -> Response {
    let ident = match req.extensions().get::<Identity>() {
        Some(i) => i,
        None => {
            log::error!("Identity extension missing; is `identify` wired outside this layer?");
            return ApiError::Unexpected(
                "Identity missing from request.".to_owned()
            ).into_response();
        },
    };

    match policy::require_approved(ident) {
        Ok(()) => next.run(req).await,
        Err(_) => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "message": "Access denied. Your account is pending approval.",
                "status": ident.status(),
            })),
        ).into_response(),
    }
}

pub async fn health() -> Response {
    respond_ok(json!({
        "success": true,
        "message": "API is running",
        "timestamp": fmt_when(OffsetDateTime::now_utc()),
    }))
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Route not found" })),
    ).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn wire_dates() {
        let d = parse_wire_date("2024-07-01", "Date").unwrap();
        assert_eq!(fmt_date(d), "2024-07-01");

        match parse_wire_date("07/01/2024", "Date") {
            Err(ApiError::Validation(msg)) => {
                assert!(msg.starts_with("Date"), "message was {:?}", msg);
            },
            other => panic!("expected Validation failure, got {:?}", other),
        }
    }
}
