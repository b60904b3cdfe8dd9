/*!
Login, registration, and the other credential-shaped endpoints.

Admin login and user login deliberately fail with the same generic
message; the response must not reveal which identity class the caller
was probing.
*/
use std::sync::Arc;

use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{
        hash_password, issue_token, verify_password, Claims, Identity,
        ADMIN_EMAIL, ADMIN_FULL_NAME,
    },
    config::Glob,
    error::ApiError,
    store::users::NewUser,
    user::{ApprovalStatus, Department, Role},
};
use super::{respond_created, respond_ok, users::user_json};

const BAD_CREDENTIALS: &str = "Invalid login credentials.";
const MIN_PASSWORD_LEN: usize = 6;

fn admin_user_json() -> serde_json::Value {
    json!({
        "fullName": ADMIN_FULL_NAME,
        "email": ADMIN_EMAIL,
        "role": Role::Admin,
        "department": Department::All,
        "status": ApprovalStatus::Approved,
    })
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginData {
    username: Option<String>,
    password: Option<String>,
}

pub async fn admin_login(
    Extension(glob): Extension<Arc<Glob>>,
    Json(form): Json<AdminLoginData>,
) -> Result<Response, ApiError> {
    log::trace!("auth::admin_login() called.");

    let (username, password) = match (form.username, form.password) {
        (Some(u), Some(p)) => (u, p),
        _ => {
            return Err(ApiError::Validation(
                "Username and password are required.".to_owned()
            ));
        },
    };

    if username != glob.cfg.admin_uname || password != glob.cfg.admin_password {
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS.to_owned()));
    }

    let claims = Claims::for_admin(glob.cfg.token_lifetime);
    let token = issue_token(&claims, &glob.cfg.jwt_secret)?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Admin login successful",
        "token": token,
        "user": admin_user_json(),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    full_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    department: Option<String>,
    role: Option<String>,
    password: Option<String>,
    confirm_password: Option<String>,
}

pub async fn register(
    Extension(glob): Extension<Arc<Glob>>,
    Json(form): Json<RegisterData>,
) -> Result<Response, ApiError> {
    log::trace!("auth::register() called.");

    let (full_name, email, phone, department, role, password, confirm_password) =
        match (
            form.full_name, form.email, form.phone, form.department,
            form.role, form.password, form.confirm_password,
        ) {
            (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f), Some(g)) =>
                (a, b, c, d, e, f, g),
            _ => {
                return Err(ApiError::Validation(
                    "All fields are required.".to_owned()
                ));
            },
        };

    if password != confirm_password {
        return Err(ApiError::Validation("Passwords do not match.".to_owned()));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must be at least 6 characters long.".to_owned()
        ));
    }

    // Nobody registers as admin; that identity is configured, not stored.
    let role: Role = match role.parse() {
        Ok(Role::Admin) | Err(_) => {
            return Err(ApiError::Validation(
                "Role must be student, teacher, or hod.".to_owned()
            ));
        },
        Ok(r) => r,
    };

    let department: Department = match department.parse() {
        Ok(Department::All) | Err(_) => {
            return Err(ApiError::Validation(
                "Department must be BCA, BCom, or BA.".to_owned()
            ));
        },
        Ok(d) => d,
    };

    let email = email.to_lowercase();
    if glob.store.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Validation("Email already registered.".to_owned()));
    }

    let new = NewUser {
        full_name,
        email,
        phone,
        department,
        role,
        password_hash: hash_password(&password)?,
    };

    let user = match glob.store.insert_user(&new).await {
        Ok(u) => u,
        // Lost the race against a concurrent registration with the
        // same email: same answer as the pre-check.
        Err(e) if e.is_unique_violation() => {
            return Err(ApiError::Validation("Email already registered.".to_owned()));
        },
        Err(e) => { return Err(e.into()); },
    };

    Ok(respond_created(json!({
        "success": true,
        "message": "Registration successful. Please wait for admin approval.",
        "user": user_json(&user),
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    email: Option<String>,
    password: Option<String>,
}

pub async fn login(
    Extension(glob): Extension<Arc<Glob>>,
    Json(form): Json<LoginData>,
) -> Result<Response, ApiError> {
    log::trace!("auth::login() called.");

    let (email, password) = match (form.email, form.password) {
        (Some(e), Some(p)) => (e, p),
        _ => {
            return Err(ApiError::Validation(
                "Email and password are required.".to_owned()
            ));
        },
    };

    let user = match glob.store.get_user_by_email(&email.to_lowercase()).await? {
        Some(u) => u,
        None => { return Err(ApiError::Unauthenticated(BAD_CREDENTIALS.to_owned())); },
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS.to_owned()));
    }

    if user.status != ApprovalStatus::Approved {
        return Ok((
            axum::http::StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "message": format!(
                    "Your account is {}. Please wait for admin approval.",
                    &user.status
                ),
                "status": user.status,
            })),
        ).into_response());
    }

    let claims = Claims::for_user(&user, glob.cfg.token_lifetime);
    let token = issue_token(&claims, &glob.cfg.jwt_secret)?;

    Ok(respond_ok(json!({
        "success": true,
        "message": "Login successful",
        "token": token,
        "user": user_json(&user),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordData {
    current_password: Option<String>,
    new_password: Option<String>,
    confirm_password: Option<String>,
}

pub async fn change_password(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
    Json(form): Json<ChangePasswordData>,
) -> Result<Response, ApiError> {
    log::trace!("auth::change_password() called.");

    let (current, new, confirm) = match (
        form.current_password, form.new_password, form.confirm_password,
    ) {
        (Some(a), Some(b), Some(c)) => (a, b, c),
        _ => {
            return Err(ApiError::Validation(
                "All password fields are required.".to_owned()
            ));
        },
    };

    if new != confirm {
        return Err(ApiError::Validation("New passwords do not match.".to_owned()));
    }
    if new.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "New password must be at least 6 characters long.".to_owned()
        ));
    }

    // The admin password lives in deployment configuration, not here.
    let user = match &ident {
        Identity::User(u) => u,
        Identity::Admin => {
            return Err(ApiError::NotFound("User not found.".to_owned()));
        },
    };

    if !verify_password(&current, &user.password_hash)? {
        return Err(ApiError::Unauthenticated(
            "Current password is incorrect.".to_owned()
        ));
    }

    let hash = hash_password(&new)?;
    if !glob.store.update_password(user.id, &hash).await? {
        return Err(ApiError::NotFound("User not found.".to_owned()));
    }

    Ok(respond_ok(json!({
        "success": true,
        "message": "Password changed successfully",
    })))
}

/// The self-profile read. This is the one authenticated route that
/// deliberately skips the status gate, so a pending user can see where
/// their account stands.
pub async fn me(
    Extension(glob): Extension<Arc<Glob>>,
    Extension(ident): Extension<Identity>,
) -> Result<Response, ApiError> {
    log::trace!("auth::me() called.");

    let user = match &ident {
        Identity::Admin => {
            return Ok(respond_ok(json!({
                "success": true,
                "user": admin_user_json(),
            })));
        },
        Identity::User(u) => u,
    };

    match glob.store.get_user_by_id(user.id).await? {
        Some(fresh) => Ok(respond_ok(json!({
            "success": true,
            "user": user_json(&fresh),
        }))),
        None => Err(ApiError::NotFound("User not found.".to_owned())),
    }
}
