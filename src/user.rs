/*!
Domain types: the persisted user record, the enumerations every
resource is scoped by, and the polymorphic "acted-by" attribution.
*/
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Hod,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Hod     => "hod",
            Role::Admin   => "admin",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "hod"     => Ok(Role::Hod),
            "admin"   => Ok(Role::Admin),
            _ => Err(format!("{:?} is not a valid role.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    #[serde(rename = "BCA")]
    Bca,
    #[serde(rename = "BCom")]
    BCom,
    #[serde(rename = "BA")]
    Ba,
    /// Wildcard department; only admin-authored records carry it.
    #[serde(rename = "all")]
    All,
}

impl std::fmt::Display for Department {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Department::Bca  => "BCA",
            Department::BCom => "BCom",
            Department::Ba   => "BA",
            Department::All  => "all",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Department {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BCA"  => Ok(Department::Bca),
            "BCom" => Ok(Department::BCom),
            "BA"   => Ok(Department::Ba),
            "all"  => Ok(Department::All),
            _ => Err(format!("{:?} is not a valid department.", s)),
        }
    }
}

/// Approval state of a user account, and also the review state of a
/// leave request (the two lifecycles share their vocabulary).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            ApprovalStatus::Pending  => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"  => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(format!("{:?} is not a valid status.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent  => "absent",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent"  => Ok(AttendanceStatus::Absent),
            _ => Err(format!("{:?} is not a valid attendance status.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            ResultStatus::Pass => "pass",
            ResultStatus::Fail => "fail",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(ResultStatus::Pass),
            "fail" => Ok(ResultStatus::Fail),
            _ => Err(format!("{:?} is not a valid result status.", s)),
        }
    }
}

/// Who a notification is aimed at. Unlike `Role` there is no admin
/// variant, and `All` addresses everyone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Student,
    Teacher,
    Hod,
    All,
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Audience::Student => "student",
            Audience::Teacher => "teacher",
            Audience::Hod     => "hod",
            Audience::All     => "all",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Audience::Student),
            "teacher" => Ok(Audience::Teacher),
            "hod"     => Ok(Audience::Hod),
            "all"     => Ok(Audience::All),
            _ => Err(format!("{:?} is not a valid target role.", s)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl std::fmt::Display for Day {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Day::Monday    => "Monday",
            Day::Tuesday   => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday  => "Thursday",
            Day::Friday    => "Friday",
            Day::Saturday  => "Saturday",
            Day::Sunday    => "Sunday",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Day {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Monday"    => Ok(Day::Monday),
            "Tuesday"   => Ok(Day::Tuesday),
            "Wednesday" => Ok(Day::Wednesday),
            "Thursday"  => Ok(Day::Thursday),
            "Friday"    => Ok(Day::Friday),
            "Saturday"  => Ok(Day::Saturday),
            "Sunday"    => Ok(Day::Sunday),
            _ => Err(format!("{:?} is not a valid day.", s)),
        }
    }
}

/// A persisted account. The password hash never serializes; responses
/// project users through `inter::users::user_json` anyway.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub department: Department,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: ApprovalStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The polymorphic "acted-by" reference carried on attendance,
/// timetable, exam, result, assignment, and notification records, and
/// on reviewed leave requests. The admin identity has no user row, so
/// the reference is a tagged variant rather than a bare id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attribution {
    Admin,
    User(i64),
}

impl std::fmt::Display for Attribution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Attribution::Admin => write!(f, "admin"),
            Attribution::User(id) => write!(f, "{}", id),
        }
    }
}

impl std::str::FromStr for Attribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "admin" {
            return Ok(Attribution::Admin);
        }
        match s.parse::<i64>() {
            Ok(id) => Ok(Attribution::User(id)),
            Err(_) => Err(format!("{:?} is not a valid attribution reference.", s)),
        }
    }
}

/// Display form of an attribution, as it appears in responses. A
/// reference whose user has since been deleted degrades to the raw id
/// string instead of failing the whole response.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributionView {
    Resolved {
        #[serde(rename = "_id")]
        id: String,
        #[serde(rename = "fullName")]
        full_name: String,
    },
    Unresolved(String),
}

impl AttributionView {
    /// The fixed admin pair. Constructing it never touches the store.
    pub fn admin() -> Self {
        AttributionView::Resolved {
            id: "admin".to_owned(),
            full_name: "Admin".to_owned(),
        }
    }

    pub fn resolved(id: i64, full_name: String) -> Self {
        AttributionView::Resolved { id: id.to_string(), full_name }
    }

    pub fn unresolved(reference: &Attribution) -> Self {
        AttributionView::Unresolved(reference.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_round_trips() {
        for role in [Role::Student, Role::Teacher, Role::Hod, Role::Admin] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
        for dept in [Department::Bca, Department::BCom, Department::Ba, Department::All] {
            let parsed: Department = dept.to_string().parse().unwrap();
            assert_eq!(dept, parsed);
        }
        assert!("BSC".parse::<Department>().is_err());
        assert!("principal".parse::<Role>().is_err());
    }

    #[test]
    fn attribution_round_trips() {
        assert_eq!("admin".parse::<Attribution>().unwrap(), Attribution::Admin);
        assert_eq!("42".parse::<Attribution>().unwrap(), Attribution::User(42));
        assert!("jenny".parse::<Attribution>().is_err());
        assert_eq!(Attribution::Admin.to_string(), "admin");
        assert_eq!(Attribution::User(7).to_string(), "7");
    }

    #[test]
    fn admin_attribution_serializes_as_fixed_pair() {
        let v = serde_json::to_value(AttributionView::admin()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "_id": "admin", "fullName": "Admin" })
        );
    }

    #[test]
    fn unresolved_attribution_serializes_as_raw_reference() {
        let v = serde_json::to_value(
            AttributionView::unresolved(&Attribution::User(99))
        ).unwrap();
        assert_eq!(v, serde_json::json!("99"));
    }

    #[test]
    fn wire_names_match_enum_tokens() {
        assert_eq!(serde_json::to_value(Role::Hod).unwrap(), serde_json::json!("hod"));
        assert_eq!(serde_json::to_value(Department::BCom).unwrap(), serde_json::json!("BCom"));
        assert_eq!(serde_json::to_value(Department::All).unwrap(), serde_json::json!("all"));
        assert_eq!(serde_json::to_value(Day::Wednesday).unwrap(), serde_json::json!("Wednesday"));
    }
}
