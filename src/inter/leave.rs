/*!
Leave-request endpoints.

Scoping is the subtlest of the resources: students and teachers see
their own requests, an HOD sees teacher-authored requests from its own
department (a join-filter on the requester, since the request itself
carries no department), and admin sees everything. Review is a
one-verdict transition stamped with reviewer and time.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;

use crate::{
    auth::Identity,
    config::Glob,
    error::ApiError,
    policy::{self, LeaveScope},
    store::leave::{LeaveEntry, LeaveQuery},
    user::{ApprovalStatus, Attribution, AttributionView, Role},
};
use super::{fmt_when, respond_created, respond_ok};

fn entry_json(entry: &LeaveEntry, reviewed_by: Option<&AttributionView>) -> serde_json::Value {
    json!({
        "id": entry.record.id,
        "requestedBy": {
            "_id": entry.record.requested_by,
            "fullName": entry.requester_full_name,
            "email": entry.requester_email,
            "department": entry.requester_department,
            "role": entry.requester_role,
        },
        "role": entry.record.role,
        "reason": entry.record.reason,
        "status": entry.record.status,
        "reviewedBy": reviewed_by,
        "reviewedAt": entry.record.reviewed_at.map(fmt_when),
        "createdAt": fmt_when(entry.record.created_at),
    })
}

/// Resolve the reviewer references for a batch of entries.
/// Unreviewed requests stay `null` in the response.
async fn reviewer_views(
    glob: &Glob,
    entries: &[LeaveEntry],
) -> Result<Vec<Option<AttributionView>>, ApiError> {
    let reviewed: Vec<(usize, Attribution)> = entries.iter()
        .enumerate()
        .filter_map(|(n, e)| {
            e.record.reviewed_by.clone().map(|r| (n, r))
        })
        .collect();

    let refs: Vec<Attribution> = reviewed.iter().map(|(_, r)| r.clone()).collect();
    let resolved = glob.store.resolve_attributions(&refs).await?;

    let mut views: Vec<Option<AttributionView>> = entries.iter().map(|_| None).collect();
    for ((n, _), view) in reviewed.into_iter().zip(resolved.into_iter()) {
        views[n] = Some(view);
    }

    Ok(views)
}

#[derive(Debug, Deserialize)]
pub struct CreateData {
    reason: Option<String>,
}

pub async fn create(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<CreateData>,
) -> Result<Response, ApiError> {
    log::trace!("leave::create() called.");

    let reason = match form.reason {
        Some(r) if !r.trim().is_empty() => r,
        _ => { return Err(ApiError::Validation("Reason is required.".to_owned())); },
    };

    // A leave request hangs off a user row; the sentinel admin has
    // none to hang it off.
    let user = match &ident {
        Identity::User(u) => u,
        Identity::Admin => {
            return Err(ApiError::Validation(
                "Leave requests can only be created by registered users.".to_owned()
            ));
        },
    };

    let entry = glob.store.insert_leave_request(
        user.id,
        user.role,
        &reason,
    ).await?;

    Ok(respond_created(json!({
        "success": true,
        "message": "Leave request created successfully",
        "leaveRequest": entry_json(&entry, None),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    status: Option<String>,
    role: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("leave::list( {:?} ) called.", &params);

    let status: Option<ApprovalStatus> = match params.status.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let role_filter: Option<Role> = match params.role.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };

    let scope = policy::leave_read_scope(&ident);
    let query = match &scope {
        LeaveScope::Own(id) => LeaveQuery {
            requested_by: Some(*id),
            role: role_filter,
            status,
        },
        // The HOD view is teacher-authored requests; the department
        // half happens after the query, below.
        LeaveScope::DepartmentTeachers(_) => LeaveQuery {
            requested_by: None,
            role: Some(Role::Teacher),
            status,
        },
        LeaveScope::Unrestricted => LeaveQuery {
            requested_by: None,
            role: role_filter,
            status,
        },
    };

    let mut entries = glob.store.list_leave_requests(&query).await?;
    if let LeaveScope::DepartmentTeachers(dept) = &scope {
        entries.retain(|e| e.requester_department == *dept);
    }

    let views = reviewer_views(&glob, &entries).await?;
    let leave_requests: Vec<serde_json::Value> = entries.iter()
        .zip(views.iter())
        .map(|(e, v)| entry_json(e, v.as_ref()))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": leave_requests.len(),
        "leaveRequests": leave_requests,
    })))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("leave::get_one( {} ) called.", id);

    let entry = match glob.store.get_leave_request(id).await? {
        Some(e) => e,
        None => {
            return Err(ApiError::NotFound("Leave request not found.".to_owned()));
        },
    };

    policy::require_leave_view(
        &ident,
        entry.record.requested_by,
        entry.requester_department,
    )?;

    let view = match &entry.record.reviewed_by {
        Some(r) => Some(glob.store.resolve_attribution(r).await?),
        None => None,
    };

    Ok(respond_ok(json!({
        "success": true,
        "leaveRequest": entry_json(&entry, view.as_ref()),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReviewData {
    status: Option<String>,
}

pub async fn review(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
    Json(form): Json<ReviewData>,
) -> Result<Response, ApiError> {
    log::trace!("leave::review( {} ) called.", id);

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let status: ApprovalStatus = match form.status.as_deref().map(str::parse) {
        Some(Ok(ApprovalStatus::Approved)) => ApprovalStatus::Approved,
        Some(Ok(ApprovalStatus::Rejected)) => ApprovalStatus::Rejected,
        _ => {
            return Err(ApiError::Validation(
                "Valid status (approved or rejected) is required.".to_owned()
            ));
        },
    };

    let entry = match glob.store.get_leave_request(id).await? {
        Some(e) => e,
        None => {
            return Err(ApiError::NotFound("Leave request not found.".to_owned()));
        },
    };

    policy::require_leave_review(
        &ident,
        entry.requester_role,
        entry.requester_department,
    )?;

    let reviewed_by = ident.attribution();
    let reviewed = glob.store.review_leave_request(
        id,
        status,
        &reviewed_by,
        OffsetDateTime::now_utc(),
    ).await?;

    let reviewed = match reviewed {
        Some(e) => e,
        None => {
            return Err(ApiError::NotFound("Leave request not found.".to_owned()));
        },
    };

    let view = match &reviewed.record.reviewed_by {
        Some(r) => Some(glob.store.resolve_attribution(r).await?),
        None => None,
    };

    Ok(respond_ok(json!({
        "success": true,
        "message": format!("Leave request {} successfully", &status),
        "leaveRequest": entry_json(&reviewed, view.as_ref()),
    })))
}

pub async fn remove(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("leave::remove( {} ) called.", id);

    let entry = match glob.store.get_leave_request(id).await? {
        Some(e) => e,
        None => {
            return Err(ApiError::NotFound("Leave request not found.".to_owned()));
        },
    };

    policy::require_leave_delete(&ident, entry.record.requested_by)?;

    glob.store.delete_leave_request(id).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Leave request deleted successfully",
    })))
}
