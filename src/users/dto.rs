use serde::{Deserialize, Serialize};

use crate::users::repo_types::{Gender, Role, User};

/// Fields needed to create an account. Everything is optional at the wire level so a
/// missing field is reported as a validation error rather than a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct NewUserFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub fields: NewUserFields,
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub message: &'static str,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}
