/*!
Attendance endpoints: mark (a natural-key upsert), scoped listing, and
per-user statistics.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
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
    store::attendance::{AttendanceEntry, AttendanceQuery, AttendanceRecord},
    user::{AttendanceStatus, AttributionView, Department, Role},
};
use super::{fmt_date, fmt_when, parse_wire_date, respond_created, respond_ok};

fn attendance_json(
    rec: &AttendanceRecord,
    user_id: serde_json::Value,
    marked_by: &AttributionView,
) -> serde_json::Value {
    json!({
        "id": rec.id,
        "userId": user_id,
        "role": rec.role,
        "date": fmt_date(rec.date),
        "status": rec.status,
        "markedBy": marked_by,
        "department": rec.department,
        "createdAt": fmt_when(rec.created_at),
    })
}

fn entry_json(entry: &AttendanceEntry, marked_by: &AttributionView) -> serde_json::Value {
    let user = json!({
        "_id": entry.record.user_id,
        "fullName": entry.user_full_name,
        "email": entry.user_email,
    });
    attendance_json(&entry.record, user, marked_by)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkData {
    user_id: Option<i64>,
    date: Option<String>,
    status: Option<String>,
}

pub async fn mark(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<MarkData>,
) -> Result<Response, ApiError> {
    log::trace!("attendance::mark() called.");

    policy::require_role(&ident, &[Role::Teacher, Role::Hod, Role::Admin])?;

    let (user_id, date, status) = match (form.user_id, form.date, form.status) {
        (Some(u), Some(d), Some(s)) => (u, d, s),
        _ => {
            return Err(ApiError::Validation(
                "User ID, date, and status are required.".to_owned()
            ));
        },
    };

    let status: AttendanceStatus = status.parse().map_err(|_| {
        ApiError::Validation(
            "Status must be either \"present\" or \"absent\".".to_owned()
        )
    })?;
    let date = parse_wire_date(&date, "Date")?;

    let subject = match glob.store.get_user_by_id(user_id).await? {
        Some(u) => u,
        None => { return Err(ApiError::NotFound("User not found.".to_owned())); },
    };

    policy::require_department_write(
        &ident,
        subject.department,
        "You can only mark attendance for users in your department.",
    )?;

    let marked_by = ident.attribution();
    let (rec, created) = glob.store.upsert_attendance(
        subject.id,
        subject.role,
        date,
        status,
        &marked_by,
        subject.department,
    ).await?;

    let view = glob.store.resolve_attribution(&rec.marked_by).await?;
    let body = json!({
        "success": true,
        "message": if created {
            "Attendance marked successfully"
        } else {
            "Attendance updated successfully"
        },
        "attendance": attendance_json(&rec, json!(rec.user_id), &view),
    });

    if created {
        Ok(respond_created(body))
    } else {
        Ok(respond_ok(body))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    user_id: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
    role: Option<String>,
    department: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("attendance::list( {:?} ) called.", &params);

    let role: Option<Role> = match params.role.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let requested_dept: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let from = match params.start_date.as_deref() {
        Some(s) => Some(parse_wire_date(s, "Start date")?),
        None => None,
    };
    let to = match params.end_date.as_deref() {
        Some(s) => Some(parse_wire_date(s, "End date")?),
        None => None,
    };

    let query = AttendanceQuery {
        user_id: policy::record_owner_scope(&ident, params.user_id),
        role,
        department: policy::department_read_scope(&ident, requested_dept),
        from,
        to,
    };

    let entries = glob.store.list_attendance(&query).await?;
    let refs: Vec<_> = entries.iter().map(|e| e.record.marked_by.clone()).collect();
    let views = glob.store.resolve_attributions(&refs).await?;

    let attendance: Vec<serde_json::Value> = entries.iter()
        .zip(views.iter())
        .map(|(e, v)| entry_json(e, v))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": attendance.len(),
        "attendance": attendance,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    user_id: Option<i64>,
    start_date: Option<String>,
    end_date: Option<String>,
}

pub async fn stats(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<StatsParams>,
) -> Result<Response, ApiError> {
    log::trace!("attendance::stats( {:?} ) called.", &params);

    let target = match policy::record_owner_scope(&ident, params.user_id) {
        Some(id) => id,
        None => {
            return Err(ApiError::Validation("User ID is required.".to_owned()));
        },
    };

    let from = match params.start_date.as_deref() {
        Some(s) => Some(parse_wire_date(s, "Start date")?),
        None => None,
    };
    let to = match params.end_date.as_deref() {
        Some(s) => Some(parse_wire_date(s, "End date")?),
        None => None,
    };

    // The aggregate rides on the same read scope as the listing.
    let department = policy::department_read_scope(&ident, None);

    let (total, present, absent) = glob.store
        .user_attendance_counts(target, from, to, department)
        .await?;

    Ok(respond_ok(json!({
        "success": true,
        "stats": {
            "total": total,
            "present": present,
            "absent": absent,
            "percentage": policy::attendance_percentage(present, total),
        },
    })))
}
