use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::extractors::{AdminOnly, AuthUser, Authorized},
    error::{AppError, AppResult},
    state::AppState,
    users::{
        dto::{CreateUserRequest, MessageResponse, UpdateUserRequest, UserResponse},
        repo_types::{Role, User},
        services::{create_user, parse_user_id, update_user},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create))
        .route("/users/role/:role", get(list_by_role))
        .route("/users/:id", get(get_user).put(update).delete(delete_user))
}

#[instrument(skip_all, fields(admin = %admin.identity.id))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
) -> AppResult<Json<Vec<User>>> {
    Ok(Json(state.users.list().await?))
}

#[instrument(skip_all, fields(admin = %admin.identity.id))]
pub async fn create(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let Json(CreateUserRequest { fields, role }) = payload?;
    let user = create_user(state.users.as_ref(), fields, role.unwrap_or_default()).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully",
            user,
        }),
    ))
}

#[instrument(skip_all, fields(admin = %admin.identity.id, role = %role))]
pub async fn list_by_role(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    Path(role): Path<String>,
) -> AppResult<Json<Vec<User>>> {
    let role: Role = role.parse().map_err(|_| {
        AppError::Validation("Invalid role. Must be one of: user, admin, moderator".into())
    })?;
    Ok(Json(state.users.list_by_role(role).await?))
}

#[instrument(skip_all, fields(id = %id))]
pub async fn get_user(
    State(state): State<AppState>,
    _: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let id = parse_user_id(&id)?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(AppError::user_not_found)?;
    Ok(Json(UserResponse {
        message: "User fetched successfully",
        user,
    }))
}

#[instrument(skip_all, fields(id = %id, caller = %caller.id))]
pub async fn update(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> AppResult<Json<UserResponse>> {
    let id = parse_user_id(&id)?;
    let Json(req) = payload?;
    let user = update_user(state.users.as_ref(), &caller, id, req).await?;
    Ok(Json(UserResponse {
        message: "User updated successfully",
        user,
    }))
}

#[instrument(skip_all, fields(id = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: Authorized<AdminOnly>,
    Path(id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_user_id(&id)?;
    if !state.users.delete(id).await? {
        return Err(AppError::user_not_found());
    }
    info!(user_id = %id, by = %admin.identity.id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}
