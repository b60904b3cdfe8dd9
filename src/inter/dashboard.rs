/*!
The dashboard aggregate. One endpoint, four shapes: what you get back
depends on who you are, and every count rides on the same scope rules
as the listings it summarizes.
*/
use std::sync::Arc;

use axum::{extract::Extension, response::Response};
use serde_json::json;

use crate::{
    auth::Identity,
    config::Glob,
    error::ApiError,
    policy,
    store::leave::LeaveQuery,
    user::{ApprovalStatus, Role, User},
};
use super::respond_ok;

async fn admin_stats(glob: &Glob) -> Result<serde_json::Value, ApiError> {
    let store = &glob.store;

    let total_users = store.count_users(None, None, None).await?;
    let pending_users = store.count_users(None, None, Some(ApprovalStatus::Pending)).await?;
    let approved_users = store.count_users(None, None, Some(ApprovalStatus::Approved)).await?;
    let students = store.count_users(Some(Role::Student), None, Some(ApprovalStatus::Approved)).await?;
    let teachers = store.count_users(Some(Role::Teacher), None, Some(ApprovalStatus::Approved)).await?;
    let hods = store.count_users(Some(Role::Hod), None, Some(ApprovalStatus::Approved)).await?;
    let total_exams = store.count_exams(None).await?;
    let total_assignments = store.count_assignments(None).await?;
    let total_notifications = store.count_notifications(None, None).await?;
    let pending_leave_requests = store.count_leave_requests(
        None, Some(ApprovalStatus::Pending)
    ).await?;

    Ok(json!({
        "totalUsers": total_users,
        "pendingUsers": pending_users,
        "approvedUsers": approved_users,
        "students": students,
        "teachers": teachers,
        "hods": hods,
        "totalExams": total_exams,
        "totalAssignments": total_assignments,
        "totalNotifications": total_notifications,
        "pendingLeaveRequests": pending_leave_requests,
    }))
}

async fn hod_stats(glob: &Glob, hod: &User) -> Result<serde_json::Value, ApiError> {
    let store = &glob.store;
    let dept = hod.department;

    let students = store.count_users(
        Some(Role::Student), Some(dept), Some(ApprovalStatus::Approved)
    ).await?;
    let teachers = store.count_users(
        Some(Role::Teacher), Some(dept), Some(ApprovalStatus::Approved)
    ).await?;
    let exams = store.count_exams(Some(dept)).await?;
    let assignments = store.count_assignments(Some(dept)).await?;
    let notifications = store.count_notifications(None, Some(dept)).await?;

    // Pending teacher requests from this department; department lives
    // on the requester, so count after the join.
    let pending = store.list_leave_requests(&LeaveQuery {
        requested_by: None,
        role: Some(Role::Teacher),
        status: Some(ApprovalStatus::Pending),
    }).await?;
    let pending_leave_requests = pending.iter()
        .filter(|e| e.requester_department == dept)
        .count();

    Ok(json!({
        "students": students,
        "teachers": teachers,
        "exams": exams,
        "assignments": assignments,
        "notifications": notifications,
        "pendingLeaveRequests": pending_leave_requests,
    }))
}

async fn teacher_stats(glob: &Glob, teacher: &User) -> Result<serde_json::Value, ApiError> {
    let store = &glob.store;
    let dept = teacher.department;

    let students = store.count_users(
        Some(Role::Student), Some(dept), Some(ApprovalStatus::Approved)
    ).await?;
    let exams = store.count_exams(Some(dept)).await?;
    let assignments = store.count_assignments(Some(dept)).await?;
    let notifications = store.count_notifications(Some("teacher"), Some(dept)).await?;
    let my_leave_requests = store.count_leave_requests(Some(teacher.id), None).await?;

    Ok(json!({
        "students": students,
        "exams": exams,
        "assignments": assignments,
        "notifications": notifications,
        "myLeaveRequests": my_leave_requests,
    }))
}

async fn student_stats(glob: &Glob, student: &User) -> Result<serde_json::Value, ApiError> {
    let store = &glob.store;
    let dept = student.department;

    let exams = store.count_exams(Some(dept)).await?;
    let assignments = store.count_assignments(Some(dept)).await?;
    let notifications = store.count_notifications(Some("student"), Some(dept)).await?;

    let (total, present, absent) =
        store.user_attendance_counts(student.id, None, None, None).await?;

    Ok(json!({
        "exams": exams,
        "assignments": assignments,
        "notifications": notifications,
        "attendance": {
            "total": total,
            "present": present,
            "absent": absent,
            "percentage": policy::attendance_percentage(present, total),
        },
    }))
}

pub async fn stats(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
) -> Result<Response, ApiError> {
    log::trace!("dashboard::stats() called.");

    let stats = match &ident {
        Identity::Admin => admin_stats(&glob).await?,
        Identity::User(u) => match u.role {
            Role::Hod => hod_stats(&glob, u).await?,
            Role::Teacher => teacher_stats(&glob, u).await?,
            Role::Student => student_stats(&glob, u).await?,
            // No persisted admin role exists; fall back to the global
            // shape if one ever appears.
            Role::Admin => admin_stats(&glob).await?,
        },
    };

    Ok(respond_ok(json!({
        "success": true,
        "stats": stats,
    })))
}
