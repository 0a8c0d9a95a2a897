use serde::{Deserialize, Serialize};

use crate::users::{
    dto::NewUserFields,
    repo_types::{Gender, User},
};

/// Request body for user registration. A `role` in the body is ignored.
pub type RegisterRequest = NewUserFields;

/// Request body for login.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Request body for updating the caller's own profile.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
}

/// Response returned after login or register.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub user: User,
}
