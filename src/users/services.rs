use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{claims::Identity, password::hash_password},
    error::{AppError, AppResult},
    users::{
        dto::{NewUserFields, UpdateUserRequest},
        repo::UserStore,
        repo_types::{Gender, NewUser, Role, User, UserChanges},
    },
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_name(name: Option<String>) -> AppResult<Option<String>> {
    match name {
        None => Ok(None),
        Some(n) => present(Some(n))
            .map(Some)
            .ok_or_else(|| AppError::Validation("Name cannot be empty".into())),
    }
}

fn check_age(age: Option<i32>) -> AppResult<Option<i32>> {
    match age {
        Some(a) if a <= 0 => Err(AppError::Validation("Age must be a positive number".into())),
        other => Ok(other),
    }
}

/// Validates the fields, hashes the password and inserts the record.
pub async fn create_user(
    store: &dyn UserStore,
    fields: NewUserFields,
    role: Role,
) -> AppResult<User> {
    let NewUserFields {
        name,
        email,
        password,
        age,
        gender,
    } = fields;

    let password = password.filter(|p| !p.is_empty());
    let (Some(name), Some(email), Some(password), Some(age), Some(gender)) =
        (present(name), present(email), password, age, gender)
    else {
        return Err(AppError::Validation("All fields are required".into()));
    };

    let email = normalize_email(&email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    check_age(Some(age))?;

    if store.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&password)?;

    // A concurrent insert that slips past the check above is caught by the unique index.
    let user = store
        .insert(NewUser {
            name,
            email,
            password_hash,
            age,
            gender,
            role,
        })
        .await?;

    info!(user_id = %user.id, role = %user.role, "user created");
    Ok(user)
}

/// Decides which changes `caller` may apply to the record `target`.
pub fn plan_update(
    caller: &Identity,
    target: Uuid,
    req: UpdateUserRequest,
) -> AppResult<UserChanges> {
    let is_admin = caller.is_admin();
    if !is_admin && caller.id != target {
        warn!(user_id = %caller.id, target = %target, "update of foreign record denied");
        return Err(AppError::Forbidden(
            "You can only update your own profile".into(),
        ));
    }

    Ok(UserChanges {
        name: check_name(req.name)?,
        age: check_age(req.age)?,
        gender: req.gender,
        role: req.role.filter(|_| is_admin),
        is_active: req.is_active.filter(|_| is_admin),
    })
}

pub async fn update_user(
    store: &dyn UserStore,
    caller: &Identity,
    target: Uuid,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let changes = plan_update(caller, target, req)?;
    let user = store
        .update(target, changes)
        .await?
        .ok_or_else(AppError::user_not_found)?;
    info!(user_id = %user.id, by = %caller.id, "user updated");
    Ok(user)
}

/// Partial update of the caller's own name/age/gender.
pub async fn update_profile(
    store: &dyn UserStore,
    user_id: Uuid,
    name: Option<String>,
    age: Option<i32>,
    gender: Option<Gender>,
) -> AppResult<User> {
    let changes = UserChanges {
        name: check_name(name)?,
        age: check_age(age)?,
        gender,
        ..UserChanges::default()
    };
    store
        .update(user_id, changes)
        .await?
        .ok_or_else(AppError::user_not_found)
}

/// Path ids that are not UUIDs cannot name a record.
pub fn parse_user_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::user_not_found())
}
