use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        services,
    },
    error::AppResult,
    state::AppState,
    users::{
        dto::{MessageResponse, UserResponse},
        services::update_profile,
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/profile", get(get_profile).put(put_profile))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let Json(payload) = payload?;
    let keys = JwtKeys::from_ref(&state);
    let (token, user) = services::register(state.users.as_ref(), &keys, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            token,
            user,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<AuthResponse>> {
    let Json(payload) = payload?;
    let keys = JwtKeys::from_ref(&state);
    let (token, user) = services::login(state.users.as_ref(), &keys, payload).await?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user,
    }))
}

/// Tokens are stateless; the client discards its copy.
#[instrument(skip_all, fields(user_id = %identity.id))]
pub async fn logout(AuthUser(identity): AuthUser) -> Json<MessageResponse> {
    info!("user logged out");
    Json(MessageResponse {
        message: "Logout successful",
    })
}

#[instrument(skip_all, fields(user_id = %identity.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> AppResult<Json<UserResponse>> {
    let user = services::profile(state.users.as_ref(), identity.id).await?;
    Ok(Json(UserResponse {
        message: "Profile fetched successfully",
        user,
    }))
}

#[instrument(skip_all, fields(user_id = %identity.id))]
pub async fn put_profile(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let Json(UpdateProfileRequest { name, age, gender }) = payload?;
    let user = update_profile(state.users.as_ref(), identity.id, name, age, gender).await?;
    info!("profile updated");
    Ok(Json(UserResponse {
        message: "Profile updated successfully",
        user,
    }))
}
