/*!
Timetable endpoints. A slot is keyed by (department, role, day,
timeSlot); posting the same slot again replaces its subject.
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
    store::timetable::{TimetableEntry, TimetableQuery},
    user::{AttributionView, Day, Department, Role},
};
use super::{respond_created, respond_ok};

fn entry_json(entry: &TimetableEntry, created_by: &AttributionView) -> serde_json::Value {
    json!({
        "id": entry.id,
        "department": entry.department,
        "role": entry.role,
        "day": entry.day,
        "subject": entry.subject,
        "timeSlot": entry.time_slot,
        "createdBy": created_by,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertData {
    day: Option<String>,
    subject: Option<String>,
    time_slot: Option<String>,
    role: Option<String>,
    department: Option<String>,
}

pub async fn upsert(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<UpsertData>,
) -> Result<Response, ApiError> {
    log::trace!("timetable::upsert() called.");

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let (day, subject, time_slot, role) = match (
        form.day, form.subject, form.time_slot, form.role,
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => {
            return Err(ApiError::Validation(
                "Day, subject, timeSlot, and role are required.".to_owned()
            ));
        },
    };

    let day: Day = day.parse().map_err(|_| ApiError::Validation(
        "Day must be a valid weekday name.".to_owned()
    ))?;

    // Timetables exist for the three user audiences, never for admin.
    let role: Role = match role.parse() {
        Ok(Role::Admin) | Err(_) => {
            return Err(ApiError::Validation(
                "Role must be student, teacher, or hod.".to_owned()
            ));
        },
        Ok(r) => r,
    };

    let requested: Option<Department> = match form.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::resolve_department(&ident, requested)?;

    let created_by = ident.attribution();
    let (entry, created) = glob.store.upsert_timetable_slot(
        department,
        role,
        day,
        &time_slot,
        &subject,
        &created_by,
    ).await?;

    let view = glob.store.resolve_attribution(&entry.created_by).await?;
    let body = json!({
        "success": true,
        "message": if created {
            "Timetable created successfully"
        } else {
            "Timetable updated successfully"
        },
        "timetable": entry_json(&entry, &view),
    });

    if created {
        Ok(respond_created(body))
    } else {
        Ok(respond_ok(body))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    role: Option<String>,
    department: Option<String>,
    day: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("timetable::list( {:?} ) called.", &params);

    let requested_dept: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let day: Option<Day> = match params.day.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };

    // A non-admin with no explicit role filter sees their own
    // audience's timetable; admin unfiltered sees all of them.
    let role: Option<Role> = match params.role.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None if ident.is_admin() => None,
        None => Some(ident.role()),
    };

    let query = TimetableQuery {
        department: policy::department_read_scope(&ident, requested_dept),
        role,
        day,
    };

    let entries = glob.store.list_timetable(&query).await?;
    let refs: Vec<_> = entries.iter().map(|e| e.created_by.clone()).collect();
    let views = glob.store.resolve_attributions(&refs).await?;

    let timetable: Vec<serde_json::Value> = entries.iter()
        .zip(views.iter())
        .map(|(e, v)| entry_json(e, v))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": timetable.len(),
        "timetable": timetable,
    })))
}

pub async fn remove(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("timetable::remove( {} ) called.", id);

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let entry = match glob.store.get_timetable_entry(id).await? {
        Some(e) => e,
        None => {
            return Err(ApiError::NotFound("Timetable entry not found.".to_owned()));
        },
    };

    policy::require_department_write(
        &ident,
        entry.department,
        "You can only delete timetable entries for your department.",
    )?;

    glob.store.delete_timetable_entry(id).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Timetable entry deleted successfully",
    })))
}
