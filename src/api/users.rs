//! User administration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Capability, User},
};

use super::AuthenticatedUser;

/// List all user accounts
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
) -> AppResult<Json<Vec<User>>> {
    session.require(Capability::ManageUsers)?;

    let users = state.services.users.list_users().await?;
    Ok(Json(users))
}

/// Remove a member account
#[utoipa::path(
    delete,
    path = "/admin/users/member/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Administrators only"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Member still has borrowed books"),
        (status = 422, description = "User is not a member")
    )
)]
pub async fn remove_member(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    session.require(Capability::ManageUsers)?;

    state.services.users.remove_member(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
