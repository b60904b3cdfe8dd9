/*!
The access-policy engine.

Every resource handler funnels its decisions through here: which roles
may perform a verb, whether the account is approved, what implicit
filters a read carries, and whether a write may touch a particular
record. Keeping the rules as pure functions over [`Identity`] means the
whole matrix is testable without a database or an HTTP stack.

The standing rules:

  * admin reads are unscoped unless the caller supplies a filter, and
    a supplied filter is honored;
  * non-admin reads are always clamped to the caller's own department,
    even when the caller asks for someone else's;
  * students are additionally clamped to their own records, and leave
    requests clamp teachers too;
  * non-admin writes land in the caller's own department, and an
    explicit `all` from a non-admin is a validation failure.
*/
use crate::{
    auth::Identity,
    error::ApiError,
    user::{ApprovalStatus, Department, Role},
};

/// A result at or above this mark is a pass.
pub const PASSING_MARKS: i32 = 40;

pub fn require_role(ident: &Identity, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&ident.role()) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access denied.".to_owned()))
    }
}

/// The admin-only gate gets its own wording.
pub fn require_admin(ident: &Identity) -> Result<(), ApiError> {
    if ident.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Access denied. Admin privileges required.".to_owned()
        ))
    }
}

/// The status gate. Runs on every authenticated route except the
/// self-profile read; the sentinel admin always passes.
pub fn require_approved(ident: &Identity) -> Result<(), ApiError> {
    if ident.is_admin() || ident.status() == ApprovalStatus::Approved {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Access denied. Your account is pending approval.".to_owned()
        ))
    }
}

/// Department filter for list/read queries. `None` means unscoped.
pub fn department_read_scope(
    ident: &Identity,
    requested: Option<Department>,
) -> Option<Department> {
    match ident {
        Identity::Admin => requested,
        Identity::User(u) => Some(u.department),
    }
}

/// Owner filter for resources with a per-owner notion (attendance
/// records, results). A student is clamped to itself no matter what
/// the query asked for.
pub fn record_owner_scope(
    ident: &Identity,
    requested: Option<i64>,
) -> Option<i64> {
    match ident {
        Identity::User(u) if u.role == Role::Student => Some(u.id),
        _ => requested,
    }
}

/// How a leave-request listing is restricted for a given caller.
#[derive(Clone, Debug, PartialEq)]
pub enum LeaveScope {
    /// Students and teachers see only what they themselves requested.
    Own(i64),
    /// An HOD sees teacher-authored requests whose requester belongs
    /// to this department. Department lives on the requester, not the
    /// request, so the department half is a post-query join-filter.
    DepartmentTeachers(Department),
    /// Admin sees everything.
    Unrestricted,
}

pub fn leave_read_scope(ident: &Identity) -> LeaveScope {
    match ident {
        Identity::Admin => LeaveScope::Unrestricted,
        Identity::User(u) => match u.role {
            Role::Student | Role::Teacher => LeaveScope::Own(u.id),
            Role::Hod => LeaveScope::DepartmentTeachers(u.department),
            // A persisted admin role does not exist, but the match is
            // total: treat it like the sentinel.
            Role::Admin => LeaveScope::Unrestricted,
        },
    }
}

/// Scope applied when listing notifications. The role key matches
/// `target_role = key OR target_role = 'all'`; a `None` department
/// means the department side is unconstrained.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationScope {
    pub role_key: String,
    pub department: Option<Department>,
}

pub fn notification_read_scope(
    ident: &Identity,
    requested_role: Option<&str>,
    requested_department: Option<Department>,
) -> NotificationScope {
    let role_key = match requested_role {
        Some(r) => r.to_owned(),
        None => ident.role().to_string(),
    };
    NotificationScope {
        role_key,
        department: department_read_scope(ident, requested_department),
    }
}

/// May this identity view a single notification?
pub fn may_view_notification(
    ident: &Identity,
    target_role_key: &str,
    department: Department,
) -> bool {
    if ident.is_admin() {
        return true;
    }
    let role_ok = target_role_key == ident.role().to_string()
        || target_role_key == "all";
    let dept_ok = department == ident.department()
        || department == Department::All;
    role_ok && dept_ok
}

/// Single-record read gate for department-scoped records: admin, or
/// the record belongs to the caller's department. (Wildcard-department
/// records are admin-authored and visible only to admin here; the
/// notification axis rules are separate.)
pub fn require_department_view(
    ident: &Identity,
    record_department: Department,
) -> Result<(), ApiError> {
    if ident.is_admin() || record_department == ident.department() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Access denied.".to_owned()))
    }
}

/// Update/delete gate for department-scoped records. `denial` is the
/// resource-specific refusal text.
pub fn require_department_write(
    ident: &Identity,
    record_department: Department,
    denial: &str,
) -> Result<(), ApiError> {
    if ident.is_admin() || record_department == ident.department() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(denial.to_owned()))
    }
}

/// Who may review (approve/reject) a leave request: admin reviews
/// anything; an HOD reviews teacher-authored requests from its own
/// department; nobody else reviews at all.
pub fn require_leave_review(
    ident: &Identity,
    requester_role: Role,
    requester_department: Department,
) -> Result<(), ApiError> {
    match ident.role() {
        Role::Admin => Ok(()),
        Role::Hod => {
            if requester_role == Role::Teacher
                && requester_department == ident.department()
            {
                Ok(())
            } else {
                Err(ApiError::Forbidden(
                    "You can only review leave requests from teachers in your department.".to_owned()
                ))
            }
        },
        _ => Err(ApiError::Forbidden("Access denied.".to_owned())),
    }
}

/// Who may view a single leave request.
pub fn require_leave_view(
    ident: &Identity,
    requester_id: i64,
    requester_department: Department,
) -> Result<(), ApiError> {
    match ident {
        Identity::Admin => Ok(()),
        Identity::User(u) => match u.role {
            Role::Student | Role::Teacher => {
                if u.id == requester_id {
                    Ok(())
                } else {
                    Err(ApiError::Forbidden("Access denied.".to_owned()))
                }
            },
            Role::Hod => {
                if u.department == requester_department {
                    Ok(())
                } else {
                    Err(ApiError::Forbidden("Access denied.".to_owned()))
                }
            },
            Role::Admin => Ok(()),
        },
    }
}

/// A leave request is deletable by its requester or by admin, at any
/// stage of its lifecycle.
pub fn require_leave_delete(
    ident: &Identity,
    requester_id: i64,
) -> Result<(), ApiError> {
    if ident.is_admin() || ident.user_id() == Some(requester_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You can only delete your own leave requests.".to_owned()
        ))
    }
}

/// Resolve the department a created/updated record will carry. Admin
/// may write anywhere, including the `all` wildcard, and defaults to
/// it; everyone else writes into their own department, and asking for
/// `all` outright is a validation failure.
pub fn resolve_department(
    ident: &Identity,
    requested: Option<Department>,
) -> Result<Department, ApiError> {
    match ident {
        Identity::Admin => Ok(requested.unwrap_or(Department::All)),
        Identity::User(u) => {
            if requested == Some(Department::All) {
                Err(ApiError::Validation(
                    "Department must be specified for non-admin users.".to_owned()
                ))
            } else {
                Ok(u.department)
            }
        },
    }
}

pub fn grade_status(marks: i32) -> crate::user::ResultStatus {
    if marks >= PASSING_MARKS {
        crate::user::ResultStatus::Pass
    } else {
        crate::user::ResultStatus::Fail
    }
}

/// Attendance percentage, rounded to two decimals; an empty record set
/// is 0 rather than a division by zero.
pub fn attendance_percentage(present: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = (present as f64 / total as f64) * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{ResultStatus, User};
    use float_cmp::approx_eq;
    use time::OffsetDateTime;

    fn user(role: Role, department: Department, status: ApprovalStatus) -> Identity {
        Identity::User(User {
            id: 5,
            full_name: "Arun Menon".to_owned(),
            email: "arun@example.edu".to_owned(),
            phone: "9812345678".to_owned(),
            department,
            role,
            password_hash: String::new(),
            status,
            created_at: OffsetDateTime::now_utc(),
        })
    }

    fn approved(role: Role, department: Department) -> Identity {
        user(role, department, ApprovalStatus::Approved)
    }

    #[test]
    fn role_gate() {
        let teacher = approved(Role::Teacher, Department::Bca);
        assert!(require_role(&teacher, &[Role::Teacher, Role::Hod, Role::Admin]).is_ok());
        assert!(require_role(&teacher, &[Role::Hod, Role::Admin]).is_err());
        assert!(require_role(&Identity::Admin, &[Role::Hod, Role::Admin]).is_ok());
        assert!(require_admin(&teacher).is_err());
        assert!(require_admin(&Identity::Admin).is_ok());
    }

    #[test]
    fn status_gate() {
        assert!(require_approved(&Identity::Admin).is_ok());
        assert!(require_approved(&approved(Role::Student, Department::Ba)).is_ok());
        assert!(require_approved(
            &user(Role::Student, Department::Ba, ApprovalStatus::Pending)
        ).is_err());
        assert!(require_approved(
            &user(Role::Teacher, Department::Bca, ApprovalStatus::Rejected)
        ).is_err());
    }

    #[test]
    fn admin_read_filters_are_honored() {
        assert_eq!(department_read_scope(&Identity::Admin, None), None);
        assert_eq!(
            department_read_scope(&Identity::Admin, Some(Department::BCom)),
            Some(Department::BCom)
        );
    }

    #[test]
    fn non_admin_reads_clamp_to_own_department() {
        let teacher = approved(Role::Teacher, Department::Ba);
        // Even an explicit request for another department is overridden.
        assert_eq!(
            department_read_scope(&teacher, Some(Department::BCom)),
            Some(Department::Ba)
        );
        assert_eq!(
            department_read_scope(&teacher, None),
            Some(Department::Ba)
        );
    }

    #[test]
    fn students_clamp_to_their_own_records() {
        let student = approved(Role::Student, Department::Bca);
        assert_eq!(record_owner_scope(&student, Some(999)), Some(5));
        assert_eq!(record_owner_scope(&student, None), Some(5));

        let hod = approved(Role::Hod, Department::Bca);
        assert_eq!(record_owner_scope(&hod, Some(999)), Some(999));
        assert_eq!(record_owner_scope(&Identity::Admin, None), None);
    }

    #[test]
    fn leave_scope_by_role() {
        assert_eq!(
            leave_read_scope(&approved(Role::Student, Department::Ba)),
            LeaveScope::Own(5)
        );
        assert_eq!(
            leave_read_scope(&approved(Role::Teacher, Department::Ba)),
            LeaveScope::Own(5)
        );
        assert_eq!(
            leave_read_scope(&approved(Role::Hod, Department::BCom)),
            LeaveScope::DepartmentTeachers(Department::BCom)
        );
        assert_eq!(leave_read_scope(&Identity::Admin), LeaveScope::Unrestricted);
    }

    #[test]
    fn leave_review_rules() {
        let hod_bca = approved(Role::Hod, Department::Bca);
        // HOD reviews teachers from its own department only.
        assert!(require_leave_review(&hod_bca, Role::Teacher, Department::Bca).is_ok());
        assert!(require_leave_review(&hod_bca, Role::Teacher, Department::BCom).is_err());
        assert!(require_leave_review(&hod_bca, Role::Student, Department::Bca).is_err());
        // Admin reviews anything.
        assert!(require_leave_review(&Identity::Admin, Role::Student, Department::Ba).is_ok());
        // Teachers review nothing.
        assert!(require_leave_review(
            &approved(Role::Teacher, Department::Bca),
            Role::Teacher,
            Department::Bca
        ).is_err());
    }

    #[test]
    fn leave_delete_is_requester_or_admin() {
        let teacher = approved(Role::Teacher, Department::Bca);
        assert!(require_leave_delete(&teacher, 5).is_ok());
        assert!(require_leave_delete(&teacher, 6).is_err());
        assert!(require_leave_delete(&Identity::Admin, 6).is_ok());
    }

    #[test]
    fn department_resolution_for_writes() {
        // Admin picks freely and defaults to the wildcard.
        assert_eq!(
            resolve_department(&Identity::Admin, None).unwrap(),
            Department::All
        );
        assert_eq!(
            resolve_department(&Identity::Admin, Some(Department::Ba)).unwrap(),
            Department::Ba
        );

        // Non-admin always writes its own department.
        let hod = approved(Role::Hod, Department::BCom);
        assert_eq!(
            resolve_department(&hod, None).unwrap(),
            Department::BCom
        );
        assert_eq!(
            resolve_department(&hod, Some(Department::Ba)).unwrap(),
            Department::BCom
        );

        // And may never write the wildcard.
        match resolve_department(&hod, Some(Department::All)) {
            Err(ApiError::Validation(_)) => {},
            other => panic!("expected Validation failure, got {:?}", other),
        }
    }

    #[test]
    fn department_write_gate() {
        let hod = approved(Role::Hod, Department::Bca);
        assert!(require_department_write(&hod, Department::Bca, "no").is_ok());
        assert!(require_department_write(&hod, Department::BCom, "no").is_err());
        // Admin-authored wildcard records are not editable by HODs.
        assert!(require_department_write(&hod, Department::All, "no").is_err());
        assert!(require_department_write(&Identity::Admin, Department::Ba, "no").is_ok());
    }

    #[test]
    fn notification_scope() {
        let student = approved(Role::Student, Department::Ba);
        let scope = notification_read_scope(&student, None, Some(Department::BCom));
        assert_eq!(scope.role_key, "student");
        // Department clamp applies to notifications too.
        assert_eq!(scope.department, Some(Department::Ba));

        let scope = notification_read_scope(&Identity::Admin, None, None);
        assert_eq!(scope.role_key, "admin");
        assert_eq!(scope.department, None);

        assert!(may_view_notification(&student, "all", Department::All));
        assert!(may_view_notification(&student, "student", Department::Ba));
        assert!(!may_view_notification(&student, "teacher", Department::Ba));
        assert!(!may_view_notification(&student, "student", Department::BCom));
        assert!(may_view_notification(&Identity::Admin, "hod", Department::Bca));
    }

    #[test]
    fn grading_boundary_is_forty() {
        assert_eq!(grade_status(39), ResultStatus::Fail);
        assert_eq!(grade_status(40), ResultStatus::Pass);
        assert_eq!(grade_status(0), ResultStatus::Fail);
        assert_eq!(grade_status(100), ResultStatus::Pass);
    }

    #[test]
    fn percentage_arithmetic() {
        assert!(approx_eq!(f64, attendance_percentage(0, 0), 0.0));
        assert!(approx_eq!(f64, attendance_percentage(1, 3), 33.33));
        assert!(approx_eq!(f64, attendance_percentage(2, 3), 66.67));
        assert!(approx_eq!(f64, attendance_percentage(5, 5), 100.0));
    }
}
