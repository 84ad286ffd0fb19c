//! Authentication and credential endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppResult,
    models::user::{
        ChangePasswordRequest, EmailRequest, LoginRequest, LoginResponse, RegisterRequest,
        ResetPasswordRequest, User,
    },
};

use super::AuthenticatedUser;

/// Plain confirmation message
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Verification link query
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VerifyQuery {
    /// Code sent in the verification email
    pub code: String,
}

/// Register a new member account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email sent", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    State(state): State<crate::AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Email not verified")
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    request.validate()?;
    let response = state
        .services
        .users
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(response))
}

/// Logout (clears the session flag; the token stays valid until it expires)
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Logged out"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
) -> AppResult<StatusCode> {
    state.services.users.logout(&session.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get the current user's account
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_by_email(&session.email).await?;
    Ok(Json(user))
}

/// Verify an email address with the code from the verification link
#[utoipa::path(
    get,
    path = "/auth/verify",
    tag = "auth",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or already used code")
    )
)]
pub async fn verify_email(
    State(state): State<crate::AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<MessageResponse>> {
    state.services.users.verify_email(&query.code).await?;
    Ok(MessageResponse::new("Email verified successfully"))
}

/// Send a new verification link
#[utoipa::path(
    post,
    path = "/auth/verify/resend",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Verification email sent", body = MessageResponse),
        (status = 404, description = "Unknown email"),
        (status = 422, description = "Email already verified")
    )
)]
pub async fn resend_verification(
    State(state): State<crate::AppState>,
    Json(request): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state.services.users.resend_verification(&request.email).await?;
    Ok(MessageResponse::new("Verification email sent"))
}

/// Request a password reset code by email
#[utoipa::path(
    post,
    path = "/auth/password-reset/request",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset code sent", body = MessageResponse),
        (status = 404, description = "Unknown email")
    )
)]
pub async fn request_password_reset(
    State(state): State<crate::AppState>,
    Json(request): Json<EmailRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state.services.users.request_password_reset(&request.email).await?;
    Ok(MessageResponse::new("Password reset code sent"))
}

/// Reset the password with a one-time code
#[utoipa::path(
    post,
    path = "/auth/password-reset/verify",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 404, description = "Unknown email")
    )
)]
pub async fn reset_password(
    State(state): State<crate::AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .services
        .users
        .reset_password(&request.email, &request.otp, &request.new_password)
        .await?;
    Ok(MessageResponse::new("Password reset successfully"))
}

/// Change the current user's password
#[utoipa::path(
    post,
    path = "/auth/password-change",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Old password is wrong")
    )
)]
pub async fn change_password(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state
        .services
        .users
        .change_password(&session.email, &request.old_password, &request.new_password)
        .await?;
    Ok(MessageResponse::new("Password changed successfully"))
}
