/*!
Credentials: bearer-token issue/verify, password hashing, and the
resolution of a presented token into an [`Identity`].

The admin identity is the tricky part. It is configured through
deployment secrets and has no user row, so its token is minted from
fixed claims and resolving it never touches the store. That property is
what keeps the admin able to log in even against an empty database.
*/
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    error::ApiError,
    store::Store,
    user::{ApprovalStatus, Attribution, Department, Role, User},
};

/// The subject claim carried by admin tokens instead of a user id.
pub const ADMIN_SUBJECT: &str = "admin";

pub const ADMIN_FULL_NAME: &str = "Admin";
pub const ADMIN_EMAIL: &str = "admin@campus.local";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub department: Department,
    pub status: ApprovalStatus,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &User, lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            sub: user.id.to_string(),
            role: user.role,
            department: user.department,
            status: user.status,
            iat: now.unix_timestamp(),
            exp: (now + lifetime).unix_timestamp(),
        }
    }

    pub fn for_admin(lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            sub: ADMIN_SUBJECT.to_owned(),
            role: Role::Admin,
            department: Department::All,
            status: ApprovalStatus::Approved,
            iat: now.unix_timestamp(),
            exp: (now + lifetime).unix_timestamp(),
        }
    }
}

pub fn issue_token(claims: &Claims, secret: &str) -> Result<String, ApiError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    ).map_err(|e| ApiError::Unexpected(format!("Error signing token: {}", &e)))
}

/// Validate signature and expiry and return the claims. Expiry gets its
/// own message so a client can tell "log in again" from "bad token";
/// both are still 401s.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, ApiError> {
    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(ApiError::Unauthenticated(
                "Token expired. Please login again.".to_owned()
            )),
            _ => Err(ApiError::Unauthenticated(
                "Invalid token. Access denied.".to_owned()
            )),
        },
    }
}

/// The resolved actor behind a request. The admin variant carries no
/// record because none exists.
#[derive(Clone, Debug)]
pub enum Identity {
    Admin,
    User(User),
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Admin => Role::Admin,
            Identity::User(u) => u.role,
        }
    }

    pub fn department(&self) -> Department {
        match self {
            Identity::Admin => Department::All,
            Identity::User(u) => u.department,
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        match self {
            Identity::Admin => ApprovalStatus::Approved,
            Identity::User(u) => u.status,
        }
    }

    pub fn attribution(&self) -> Attribution {
        match self {
            Identity::Admin => Attribution::Admin,
            Identity::User(u) => Attribution::User(u.id),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::Admin => None,
            Identity::User(u) => Some(u.id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Admin)
    }
}

/// Turn a presented bearer token into an [`Identity`].
///
/// Admin claims short-circuit with no store lookup. Everything else is
/// looked up by the subject id; a token whose user has since been
/// deleted fails cleanly as unauthenticated.
pub async fn resolve(
    token: &str,
    secret: &str,
    store: &Store,
) -> Result<Identity, ApiError> {
    let claims = decode_claims(token, secret)?;

    if claims.sub == ADMIN_SUBJECT && claims.role == Role::Admin {
        return Ok(Identity::Admin);
    }

    let user_id: i64 = match claims.sub.parse() {
        Ok(n) => n,
        Err(_) => {
            log::warn!("Well-signed token with unparseable subject {:?}.", &claims.sub);
            return Err(ApiError::Unauthenticated(
                "Invalid token. Access denied.".to_owned()
            ));
        },
    };

    match store.get_user_by_id(user_id).await? {
        Some(user) => Ok(Identity::User(user)),
        None => Err(ApiError::Unauthenticated(
            "User not found. Token invalid.".to_owned()
        )),
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::Unexpected(format!("Error hashing password: {}", &e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    bcrypt::verify(password, hash)
        .map_err(|e| ApiError::Unexpected(format!("Error verifying password: {}", &e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    const TEST_SECRET: &str = "a perfectly adequate test secret";

    fn test_user() -> User {
        User {
            id: 17,
            full_name: "Priya Nair".to_owned(),
            email: "priya@example.edu".to_owned(),
            phone: "9876543210".to_owned(),
            department: Department::Bca,
            role: Role::Teacher,
            password_hash: String::new(),
            status: ApprovalStatus::Approved,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn token_round_trip() {
        ensure_logging();

        let claims = Claims::for_user(&test_user(), Duration::days(7));
        let token = issue_token(&claims, TEST_SECRET).unwrap();
        let decoded = decode_claims(&token, TEST_SECRET).unwrap();

        assert_eq!(decoded.sub, "17");
        assert_eq!(decoded.role, Role::Teacher);
        assert_eq!(decoded.department, Department::Bca);
        assert_eq!(decoded.status, ApprovalStatus::Approved);
    }

    #[test]
    fn admin_claims_are_the_sentinel() {
        ensure_logging();

        let claims = Claims::for_admin(Duration::days(7));
        assert_eq!(claims.sub, ADMIN_SUBJECT);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.department, Department::All);
        assert_eq!(claims.status, ApprovalStatus::Approved);
    }

    #[test]
    fn expired_token_names_expiry() {
        ensure_logging();

        let claims = Claims {
            // Expired well past jsonwebtoken's default leeway.
            exp: (OffsetDateTime::now_utc() - Duration::hours(2)).unix_timestamp(),
            ..Claims::for_user(&test_user(), Duration::days(7))
        };
        let token = issue_token(&claims, TEST_SECRET).unwrap();

        match decode_claims(&token, TEST_SECRET) {
            Err(ApiError::Unauthenticated(msg)) => {
                assert!(msg.contains("expired"), "message was {:?}", msg);
            },
            other => panic!("expected Unauthenticated, got {:?}", other),
        }
    }

    #[test]
    fn tampered_token_is_invalid() {
        ensure_logging();

        let claims = Claims::for_user(&test_user(), Duration::days(7));
        let token = issue_token(&claims, TEST_SECRET).unwrap();

        match decode_claims(&token, "some other secret") {
            Err(ApiError::Unauthenticated(msg)) => {
                assert!(msg.contains("Invalid token"), "message was {:?}", msg);
            },
            other => panic!("expected Unauthenticated, got {:?}", other),
        }
    }

    #[test]
    fn admin_identity_needs_no_record() {
        ensure_logging();

        let ident = Identity::Admin;
        assert_eq!(ident.role(), Role::Admin);
        assert_eq!(ident.department(), Department::All);
        assert_eq!(ident.status(), ApprovalStatus::Approved);
        assert_eq!(ident.attribution(), Attribution::Admin);
        assert_eq!(ident.user_id(), None);
    }

    #[test]
    fn password_hash_round_trip() {
        ensure_logging();

        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }
}
