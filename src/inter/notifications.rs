/*!
Notification endpoints. Visibility is two-axis (target role and
department, each with an `all` wildcard); a reader must match both.
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
    store::notifications::Notification,
    user::{Attribution, AttributionView, Audience, Department, Role},
};
use super::{fmt_when, respond_created, respond_ok};

fn notification_json(n: &Notification, created_by: &AttributionView) -> serde_json::Value {
    json!({
        "id": n.id,
        "title": n.title,
        "description": n.description,
        "media": n.media,
        "targetRole": n.target_role,
        "department": n.department,
        "createdBy": created_by,
        "createdAt": fmt_when(n.created_at),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateData {
    title: Option<String>,
    description: Option<String>,
    media: Option<String>,
    target_role: Option<String>,
    department: Option<String>,
}

pub async fn create(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<CreateData>,
) -> Result<Response, ApiError> {
    log::trace!("notifications::create() called.");

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let (title, description, target_role) = match (
        form.title, form.description, form.target_role,
    ) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return Err(ApiError::Validation(
                "Title, description, and target role are required.".to_owned()
            ));
        },
    };

    let target_role: Audience = target_role.parse().map_err(|_| {
        ApiError::Validation(
            "Target role must be student, teacher, hod, or all.".to_owned()
        )
    })?;

    let requested: Option<Department> = match form.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::resolve_department(&ident, requested)?;

    let created_by = ident.attribution();
    let notification = glob.store.insert_notification(
        &title,
        &description,
        form.media.as_deref(),
        target_role,
        department,
        &created_by,
    ).await?;

    let view = glob.store.resolve_attribution(&notification.created_by).await?;

    Ok(respond_created(json!({
        "success": true,
        "message": "Notification created successfully",
        "notification": notification_json(&notification, &view),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    target_role: Option<String>,
    department: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("notifications::list( {:?} ) called.", &params);

    let requested_dept: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };

    let scope = policy::notification_read_scope(
        &ident,
        params.target_role.as_deref(),
        requested_dept,
    );

    let notifications = glob.store.list_notifications(&scope).await?;
    let refs: Vec<Attribution> = notifications.iter()
        .map(|n| n.created_by.clone())
        .collect();
    let views = glob.store.resolve_attributions(&refs).await?;

    let notifications: Vec<serde_json::Value> = notifications.iter()
        .zip(views.iter())
        .map(|(n, v)| notification_json(n, v))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": notifications.len(),
        "notifications": notifications,
    })))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("notifications::get_one( {} ) called.", id);

    let notification = match glob.store.get_notification(id).await? {
        Some(n) => n,
        None => {
            return Err(ApiError::NotFound("Notification not found.".to_owned()));
        },
    };

    if !policy::may_view_notification(
        &ident,
        &notification.target_role.to_string(),
        notification.department,
    ) {
        return Err(ApiError::Forbidden("Access denied.".to_owned()));
    }

    let view = glob.store.resolve_attribution(&notification.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "notification": notification_json(&notification, &view),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    title: Option<String>,
    description: Option<String>,
    media: Option<Option<String>>,
    target_role: Option<String>,
    department: Option<String>,
}

pub async fn update(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
    Json(form): Json<UpdateData>,
) -> Result<Response, ApiError> {
    log::trace!("notifications::update( {} ) called.", id);

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let notification = match glob.store.get_notification(id).await? {
        Some(n) => n,
        None => {
            return Err(ApiError::NotFound("Notification not found.".to_owned()));
        },
    };

    policy::require_department_write(
        &ident,
        notification.department,
        "You can only update notifications for your department.",
    )?;

    let target_role: Option<Audience> = match form.target_role.as_deref() {
        Some(s) => Some(s.parse().map_err(|_| ApiError::Validation(
            "Target role must be student, teacher, hod, or all.".to_owned()
        ))?),
        None => None,
    };

    // A retargeted department still follows the write rules: only
    // admin can point a notification somewhere else.
    let department: Option<Department> = match form.department.as_deref() {
        Some(s) => {
            let requested: Department = s.parse().map_err(ApiError::Validation)?;
            Some(policy::resolve_department(&ident, Some(requested))?)
        },
        None => None,
    };

    let updated = glob.store.update_notification(
        id,
        form.title.as_deref(),
        form.description.as_deref(),
        form.media.as_ref().map(|m| m.as_deref()),
        target_role,
        department,
    ).await?;

    let updated = match updated {
        Some(n) => n,
        None => {
            return Err(ApiError::NotFound("Notification not found.".to_owned()));
        },
    };
    let view = glob.store.resolve_attribution(&updated.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Notification updated successfully",
        "notification": notification_json(&updated, &view),
    })))
}

pub async fn remove(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("notifications::remove( {} ) called.", id);

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let notification = match glob.store.get_notification(id).await? {
        Some(n) => n,
        None => {
            return Err(ApiError::NotFound("Notification not found.".to_owned()));
        },
    };

    policy::require_department_write(
        &ident,
        notification.department,
        "You can only delete notifications for your department.",
    )?;

    glob.store.delete_notification(id).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Notification deleted successfully",
    })))
}
