//! API handlers for Librario REST endpoints

pub mod auth;
pub mod books;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, services::tokens::Session, AppState};

/// Extractor for the caller's session, read from the Bearer token
pub struct AuthenticatedUser(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let session = state.services.tokens.verify(token)?;

        Ok(AuthenticatedUser(session))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication and credentials
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route("/auth/verify", get(auth::verify_email))
        .route("/auth/verify/resend", post(auth::resend_verification))
        .route("/auth/password-reset/request", post(auth::request_password_reset))
        .route("/auth/password-reset/verify", post(auth::reset_password))
        .route("/auth/password-change", post(auth::change_password))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        // Lending
        .route("/borrow/:book_id", post(loans::borrow))
        .route("/borrow/return/:record_id", put(loans::return_copy))
        .route("/borrow/user/:email", get(loans::loans_for_user))
        .route("/borrow/book/:book_id", get(loans::loans_for_book))
        .route("/borrow/all", get(loans::all_loans))
        // Administration
        .route("/admin/users", get(users::list_users))
        .route("/admin/users/member/:id", delete(users::remove_member))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
