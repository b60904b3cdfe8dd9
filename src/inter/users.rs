/*!
User administration and profile endpoints.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::Identity,
    config::Glob,
    error::ApiError,
    policy,
    store::users::UserQuery,
    user::{ApprovalStatus, Department, Role, User},
};
use super::{fmt_when, respond_ok};

pub fn user_json(u: &User) -> serde_json::Value {
    json!({
        "id": u.id,
        "fullName": u.full_name,
        "email": u.email,
        "phone": u.phone,
        "department": u.department,
        "role": u.role,
        "status": u.status,
        "createdAt": fmt_when(u.created_at),
    })
}

/// The slimmer projection used by the directory listing.
fn directory_json(u: &User) -> serde_json::Value {
    json!({
        "id": u.id,
        "fullName": u.full_name,
        "email": u.email,
        "phone": u.phone,
        "department": u.department,
        "role": u.role,
    })
}

pub async fn profile(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
) -> Result<Response, ApiError> {
    log::trace!("users::profile() called.");

    let id = match ident.user_id() {
        Some(id) => id,
        // The sentinel admin has no profile row to show here; `me`
        // handles its synthetic profile.
        None => { return Err(ApiError::NotFound("User not found.".to_owned())); },
    };

    match glob.store.get_user_by_id(id).await? {
        Some(u) => Ok(respond_ok(json!({
            "success": true,
            "user": user_json(&u),
        }))),
        None => Err(ApiError::NotFound("User not found.".to_owned())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    full_name: Option<String>,
    phone: Option<String>,
}

pub async fn update_profile(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<ProfileUpdate>,
) -> Result<Response, ApiError> {
    log::trace!("users::update_profile() called.");

    let id = match ident.user_id() {
        Some(id) => id,
        None => { return Err(ApiError::NotFound("User not found.".to_owned())); },
    };

    let updated = glob.store.update_profile(
        id,
        form.full_name.as_deref(),
        form.phone.as_deref(),
    ).await?;

    match updated {
        Some(u) => Ok(respond_ok(json!({
            "success": true,
            "message": "Profile updated successfully",
            "user": user_json(&u),
        }))),
        None => Err(ApiError::NotFound("User not found.".to_owned())),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    status: Option<String>,
    role: Option<String>,
    department: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

/// Admin-only: the full, filterable, paginated user roll.
pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("users::list( {:?} ) called.", &params);

    policy::require_admin(&ident)?;

    let status: Option<ApprovalStatus> = match params.status.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let role: Option<Role> = match params.role.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(10).clamp(1, 100);

    let query = UserQuery {
        status,
        role,
        department,
        limit,
        offset: (page - 1) * limit,
    };

    let (users, total) = glob.store.list_users(&query).await?;
    let pages = (total + limit - 1) / limit;
    let users: Vec<serde_json::Value> = users.iter().map(user_json).collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": users.len(),
        "total": total,
        "page": page,
        "pages": pages,
        "users": users,
    })))
}

/// Admin-only: accounts awaiting a verdict, newest first.
pub async fn pending(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
) -> Result<Response, ApiError> {
    log::trace!("users::pending() called.");

    policy::require_admin(&ident)?;

    let users = glob.store.list_pending_users().await?;
    let users: Vec<serde_json::Value> = users.iter().map(user_json).collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    status: Option<String>,
}

/// Admin-only: approve or reject (or re-pend) an account.
pub async fn update_status(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
    Json(form): Json<StatusUpdate>,
) -> Result<Response, ApiError> {
    log::trace!("users::update_status( {} ) called.", id);

    policy::require_admin(&ident)?;

    let status: ApprovalStatus = match form.status.as_deref().map(str::parse) {
        Some(Ok(s)) => s,
        _ => {
            return Err(ApiError::Validation(
                "Valid status (pending, approved, rejected) is required.".to_owned()
            ));
        },
    };

    match glob.store.update_status(id, status).await? {
        Some(u) => Ok(respond_ok(json!({
            "success": true,
            "message": format!("User status updated to {}", &status),
            "user": user_json(&u),
        }))),
        None => Err(ApiError::NotFound("User not found.".to_owned())),
    }
}

#[derive(Debug, Deserialize)]
pub struct ByRoleParams {
    role: Option<String>,
    department: Option<String>,
}

/// The directory: approved users by role, department-clamped for
/// everyone but admin.
pub async fn by_role(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ByRoleParams>,
) -> Result<Response, ApiError> {
    log::trace!("users::by_role( {:?} ) called.", &params);

    let role: Option<Role> = match params.role.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let requested: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::department_read_scope(&ident, requested);

    let users = glob.store.list_users_by_role(role, department).await?;
    let users: Vec<serde_json::Value> = users.iter().map(directory_json).collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}
