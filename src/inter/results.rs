/*!
Result endpoints. Submitting marks for the same (student, exam,
subject) again corrects the stored record; pass/fail is derived from
the marks at the passing boundary, never supplied by the caller.
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
    store::results::{ResultEntry, ResultQuery, ResultRecord},
    user::{AttributionView, Role},
};
use super::{fmt_when, respond_created, respond_ok};

fn record_json(
    rec: &ResultRecord,
    student: serde_json::Value,
    exam: serde_json::Value,
    created_by: &AttributionView,
) -> serde_json::Value {
    json!({
        "id": rec.id,
        "studentId": student,
        "examId": exam,
        "subject": rec.subject,
        "marks": rec.marks,
        "status": rec.status,
        "createdBy": created_by,
        "createdAt": fmt_when(rec.created_at),
    })
}

fn entry_json(entry: &ResultEntry, created_by: &AttributionView) -> serde_json::Value {
    let student = json!({
        "_id": entry.record.student_id,
        "fullName": entry.student_full_name,
        "email": entry.student_email,
        "department": entry.student_department,
    });
    let exam = json!({
        "_id": entry.record.exam_id,
        "examName": entry.exam_name,
        "department": entry.exam_department,
    });
    record_json(&entry.record, student, exam, created_by)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateData {
    student_id: Option<i64>,
    exam_id: Option<i64>,
    subject: Option<String>,
    marks: Option<i32>,
}

pub async fn create(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<CreateData>,
) -> Result<Response, ApiError> {
    log::trace!("results::create() called.");

    policy::require_role(&ident, &[Role::Teacher, Role::Hod, Role::Admin])?;

    let (student_id, exam_id, subject, marks) = match (
        form.student_id, form.exam_id, form.subject, form.marks,
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => {
            return Err(ApiError::Validation(
                "Student ID, exam ID, subject, and marks are required.".to_owned()
            ));
        },
    };

    if !(0..=100).contains(&marks) {
        return Err(ApiError::Validation(
            "Marks must be between 0 and 100.".to_owned()
        ));
    }

    let student = match glob.store.get_user_by_id(student_id).await? {
        Some(u) if u.role == Role::Student => u,
        _ => { return Err(ApiError::NotFound("Student not found.".to_owned())); },
    };

    let exam = match glob.store.get_exam(exam_id).await? {
        Some(e) => e,
        None => { return Err(ApiError::NotFound("Exam not found.".to_owned())); },
    };

    policy::require_department_write(
        &ident,
        exam.department,
        "You can only add results for exams in your department.",
    )?;

    let status = policy::grade_status(marks);
    let created_by = ident.attribution();
    let (rec, created) = glob.store.upsert_result(
        student.id,
        exam.id,
        &subject,
        marks,
        status,
        &created_by,
    ).await?;

    let view = glob.store.resolve_attribution(&rec.created_by).await?;
    let body = json!({
        "success": true,
        "message": if created {
            "Result created successfully"
        } else {
            "Result updated successfully"
        },
        "result": record_json(&rec, json!(rec.student_id), json!(rec.exam_id), &view),
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
    student_id: Option<i64>,
    exam_id: Option<i64>,
    subject: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("results::list( {:?} ) called.", &params);

    let query = ResultQuery {
        student_id: policy::record_owner_scope(&ident, params.student_id),
        exam_id: params.exam_id,
        subject: params.subject,
    };

    let entries = glob.store.list_results(&query).await?;
    let refs: Vec<_> = entries.iter().map(|e| e.record.created_by.clone()).collect();
    let views = glob.store.resolve_attributions(&refs).await?;

    let results: Vec<serde_json::Value> = entries.iter()
        .zip(views.iter())
        .map(|(e, v)| entry_json(e, v))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": results.len(),
        "results": results,
    })))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("results::get_one( {} ) called.", id);

    let entry = match glob.store.get_result(id).await? {
        Some(e) => e,
        None => { return Err(ApiError::NotFound("Result not found.".to_owned())); },
    };

    // A student may only look at their own result.
    if ident.role() == Role::Student
        && ident.user_id() != Some(entry.record.student_id)
    {
        return Err(ApiError::Forbidden("Access denied.".to_owned()));
    }

    let view = glob.store.resolve_attribution(&entry.record.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "result": entry_json(&entry, &view),
    })))
}

pub async fn remove(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("results::remove( {} ) called.", id);

    if policy::require_role(&ident, &[Role::Hod, Role::Admin]).is_err() {
        return Err(ApiError::Forbidden(
            "Access denied. Only HOD and Admin can delete results.".to_owned()
        ));
    }

    if !glob.store.delete_result(id).await? {
        return Err(ApiError::NotFound("Result not found.".to_owned()));
    }

    Ok(respond_ok(json!({
        "success": true,
        "message": "Result deleted successfully",
    })))
}
