/*!
Assignment endpoints. Straight CRUD under the department rules.
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
    store::assignments::Assignment,
    user::{AttributionView, Department, Role},
};
use super::{fmt_date, fmt_when, parse_wire_date, respond_created, respond_ok};

fn assignment_json(a: &Assignment, created_by: &AttributionView) -> serde_json::Value {
    json!({
        "id": a.id,
        "department": a.department,
        "subject": a.subject,
        "questions": a.questions,
        "dueDate": fmt_date(a.due_date),
        "marks": a.marks,
        "createdBy": created_by,
        "createdAt": fmt_when(a.created_at),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateData {
    subject: Option<String>,
    questions: Option<String>,
    due_date: Option<String>,
    marks: Option<i32>,
    department: Option<String>,
}

pub async fn create(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<CreateData>,
) -> Result<Response, ApiError> {
    log::trace!("assignments::create() called.");

    policy::require_role(&ident, &[Role::Teacher, Role::Hod, Role::Admin])?;

    let (subject, questions, due_date, marks) = match (
        form.subject, form.questions, form.due_date, form.marks,
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => {
            return Err(ApiError::Validation(
                "Subject, questions, due date, and marks are required.".to_owned()
            ));
        },
    };

    if marks < 0 {
        return Err(ApiError::Validation("Marks cannot be negative.".to_owned()));
    }
    let due_date = parse_wire_date(&due_date, "Due date")?;

    let requested: Option<Department> = match form.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::resolve_department(&ident, requested)?;

    let created_by = ident.attribution();
    let assignment = glob.store.insert_assignment(
        department,
        &subject,
        &questions,
        due_date,
        marks,
        &created_by,
    ).await?;

    let view = glob.store.resolve_attribution(&assignment.created_by).await?;

    Ok(respond_created(json!({
        "success": true,
        "message": "Assignment created successfully",
        "assignment": assignment_json(&assignment, &view),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    department: Option<String>,
    subject: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("assignments::list( {:?} ) called.", &params);

    let requested: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::department_read_scope(&ident, requested);

    let assignments = glob.store.list_assignments(
        department,
        params.subject.as_deref(),
    ).await?;
    let refs: Vec<_> = assignments.iter().map(|a| a.created_by.clone()).collect();
    let views = glob.store.resolve_attributions(&refs).await?;

    let assignments: Vec<serde_json::Value> = assignments.iter()
        .zip(views.iter())
        .map(|(a, v)| assignment_json(a, v))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": assignments.len(),
        "assignments": assignments,
    })))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("assignments::get_one( {} ) called.", id);

    let assignment = match glob.store.get_assignment(id).await? {
        Some(a) => a,
        None => {
            return Err(ApiError::NotFound("Assignment not found.".to_owned()));
        },
    };

    policy::require_department_view(&ident, assignment.department)?;

    let view = glob.store.resolve_attribution(&assignment.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "assignment": assignment_json(&assignment, &view),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    subject: Option<String>,
    questions: Option<String>,
    due_date: Option<String>,
    marks: Option<i32>,
}

pub async fn update(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
    Json(form): Json<UpdateData>,
) -> Result<Response, ApiError> {
    log::trace!("assignments::update( {} ) called.", id);

    policy::require_role(&ident, &[Role::Teacher, Role::Hod, Role::Admin])?;

    let assignment = match glob.store.get_assignment(id).await? {
        Some(a) => a,
        None => {
            return Err(ApiError::NotFound("Assignment not found.".to_owned()));
        },
    };

    policy::require_department_write(
        &ident,
        assignment.department,
        "You can only update assignments for your department.",
    )?;

    if let Some(m) = form.marks {
        if m < 0 {
            return Err(ApiError::Validation("Marks cannot be negative.".to_owned()));
        }
    }
    let due_date = match form.due_date.as_deref() {
        Some(s) => Some(parse_wire_date(s, "Due date")?),
        None => None,
    };

    let updated = glob.store.update_assignment(
        id,
        form.subject.as_deref(),
        form.questions.as_deref(),
        due_date,
        form.marks,
    ).await?;

    let updated = match updated {
        Some(a) => a,
        None => {
            return Err(ApiError::NotFound("Assignment not found.".to_owned()));
        },
    };
    let view = glob.store.resolve_attribution(&updated.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Assignment updated successfully",
        "assignment": assignment_json(&updated, &view),
    })))
}

pub async fn remove(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("assignments::remove( {} ) called.", id);

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let assignment = match glob.store.get_assignment(id).await? {
        Some(a) => a,
        None => {
            return Err(ApiError::NotFound("Assignment not found.".to_owned()));
        },
    };

    policy::require_department_write(
        &ident,
        assignment.department,
        "You can only delete assignments for your department.",
    )?;

    glob.store.delete_assignment(id).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Assignment deleted successfully",
    })))
}
