/*!
Exam endpoints. An exam is a schedule window plus a list of subject
sessions (name, date, time, venue).
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
    store::exams::{Exam, ExamSubject},
    user::{AttributionView, Department, Role},
};
use super::{fmt_date, fmt_when, parse_wire_date, respond_created, respond_ok};

fn exam_json(exam: &Exam, created_by: &AttributionView) -> serde_json::Value {
    json!({
        "id": exam.id,
        "department": exam.department,
        "examName": exam.exam_name,
        "subjects": exam.subjects,
        "examSchedule": {
            "startDate": fmt_date(exam.start_date),
            "endDate": fmt_date(exam.end_date),
        },
        "createdBy": created_by,
        "createdAt": fmt_when(exam.created_at),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectData {
    subject_name: Option<String>,
    date: Option<String>,
    time: Option<String>,
    venue: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleData {
    start_date: Option<String>,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateData {
    exam_name: Option<String>,
    subjects: Option<Vec<SubjectData>>,
    exam_schedule: Option<ScheduleData>,
    department: Option<String>,
}

fn parse_subjects(raw: Vec<SubjectData>) -> Result<Vec<ExamSubject>, ApiError> {
    let mut subjects: Vec<ExamSubject> = Vec::with_capacity(raw.len());
    for s in raw.into_iter() {
        let (subject_name, date, time) = match (s.subject_name, s.date, s.time) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(ApiError::Validation(
                    "Each subject requires subjectName, date, and time.".to_owned()
                ));
            },
        };
        subjects.push(ExamSubject {
            subject_name,
            date: parse_wire_date(&date, "Subject date")?,
            time,
            venue: s.venue,
        });
    }
    Ok(subjects)
}

fn parse_schedule(raw: ScheduleData) -> Result<(time::Date, time::Date), ApiError> {
    let (start, end) = match (raw.start_date, raw.end_date) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ApiError::Validation(
                "Exam schedule requires startDate and endDate.".to_owned()
            ));
        },
    };
    Ok((
        parse_wire_date(&start, "Start date")?,
        parse_wire_date(&end, "End date")?,
    ))
}

pub async fn create(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<CreateData>,
) -> Result<Response, ApiError> {
    log::trace!("exams::create() called.");

    policy::require_role(&ident, &[Role::Teacher, Role::Hod, Role::Admin])?;

    let (exam_name, subjects, schedule) = match (
        form.exam_name, form.subjects, form.exam_schedule,
    ) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return Err(ApiError::Validation(
                "Exam name, subjects, and exam schedule are required.".to_owned()
            ));
        },
    };

    if subjects.is_empty() {
        return Err(ApiError::Validation(
            "Subjects must be a non-empty array.".to_owned()
        ));
    }
    let subjects = parse_subjects(subjects)?;
    let (start_date, end_date) = parse_schedule(schedule)?;

    let requested: Option<Department> = match form.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::resolve_department(&ident, requested)?;

    let created_by = ident.attribution();
    let exam = glob.store.insert_exam(
        department,
        &exam_name,
        &subjects,
        start_date,
        end_date,
        &created_by,
    ).await?;

    let view = glob.store.resolve_attribution(&exam.created_by).await?;

    Ok(respond_created(json!({
        "success": true,
        "message": "Exam created successfully",
        "exam": exam_json(&exam, &view),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    department: Option<String>,
}

pub async fn list(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Query(params): Query<ListParams>,
) -> Result<Response, ApiError> {
    log::trace!("exams::list( {:?} ) called.", &params);

    let requested: Option<Department> = match params.department.as_deref() {
        Some(s) => Some(s.parse().map_err(ApiError::Validation)?),
        None => None,
    };
    let department = policy::department_read_scope(&ident, requested);

    let exams = glob.store.list_exams(department).await?;
    let refs: Vec<_> = exams.iter().map(|e| e.created_by.clone()).collect();
    let views = glob.store.resolve_attributions(&refs).await?;

    let exams: Vec<serde_json::Value> = exams.iter()
        .zip(views.iter())
        .map(|(e, v)| exam_json(e, v))
        .collect();

    Ok(respond_ok(json!({
        "success": true,
        "count": exams.len(),
        "exams": exams,
    })))
}

pub async fn get_one(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("exams::get_one( {} ) called.", id);

    let exam = match glob.store.get_exam(id).await? {
        Some(e) => e,
        None => { return Err(ApiError::NotFound("Exam not found.".to_owned())); },
    };

    policy::require_department_view(&ident, exam.department)?;

    let view = glob.store.resolve_attribution(&exam.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "exam": exam_json(&exam, &view),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateData {
    exam_name: Option<String>,
    subjects: Option<Vec<SubjectData>>,
    exam_schedule: Option<ScheduleData>,
}

pub async fn update(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
    Json(form): Json<UpdateData>,
) -> Result<Response, ApiError> {
    log::trace!("exams::update( {} ) called.", id);

    policy::require_role(&ident, &[Role::Teacher, Role::Hod, Role::Admin])?;

    let exam = match glob.store.get_exam(id).await? {
        Some(e) => e,
        None => { return Err(ApiError::NotFound("Exam not found.".to_owned())); },
    };

    policy::require_department_write(
        &ident,
        exam.department,
        "You can only update exams for your department.",
    )?;

    let subjects = match form.subjects {
        Some(raw) => {
            if raw.is_empty() {
                return Err(ApiError::Validation(
                    "Subjects must be a non-empty array.".to_owned()
                ));
            }
            Some(parse_subjects(raw)?)
        },
        None => None,
    };
    let (start_date, end_date) = match form.exam_schedule {
        Some(raw) => {
            let (s, e) = parse_schedule(raw)?;
            (Some(s), Some(e))
        },
        None => (None, None),
    };

    let updated = glob.store.update_exam(
        id,
        form.exam_name.as_deref(),
        subjects.as_deref(),
        start_date,
        end_date,
    ).await?;

    let updated = match updated {
        Some(e) => e,
        None => { return Err(ApiError::NotFound("Exam not found.".to_owned())); },
    };
    let view = glob.store.resolve_attribution(&updated.created_by).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Exam updated successfully",
        "exam": exam_json(&updated, &view),
    })))
}

pub async fn remove(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    log::trace!("exams::remove( {} ) called.", id);

    policy::require_role(&ident, &[Role::Hod, Role::Admin])?;

    let exam = match glob.store.get_exam(id).await? {
        Some(e) => e,
        None => { return Err(ApiError::NotFound("Exam not found.".to_owned())); },
    };

    policy::require_department_write(
        &ident,
        exam.department,
        "You can only delete exams for your department.",
    )?;

    glob.store.delete_exam(id).await?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Exam deleted successfully",
    })))
}
