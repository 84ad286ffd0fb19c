//! Lending endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{BorrowRecord, Capability, LoanView},
};

use super::AuthenticatedUser;

/// Borrower of a copy
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BorrowQuery {
    /// Email of the borrowing member; must be the caller's own
    pub email: String,
}

/// Borrow one copy of a book
#[utoipa::path(
    post,
    path = "/borrow/{book_id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Uuid, Path, description = "Book ID"),
        BorrowQuery
    ),
    responses(
        (status = 201, description = "Copy borrowed", body = BorrowRecord),
        (status = 403, description = "Only members can borrow, for themselves"),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "Already borrowed by this user, or no copy available")
    )
)]
pub async fn borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
    Query(query): Query<BorrowQuery>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    session.require(Capability::Borrow)?;
    if !session.email.eq_ignore_ascii_case(&query.email) {
        return Err(AppError::Authorization(
            "Members can only borrow for themselves".to_string(),
        ));
    }

    let record = state.services.loans.borrow(book_id, &query.email).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Return a borrowed copy
#[utoipa::path(
    put,
    path = "/borrow/return/{record_id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("record_id" = i64, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Copy returned", body = BorrowRecord),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Borrow record not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_copy(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(record_id): Path<i64>,
) -> AppResult<Json<BorrowRecord>> {
    session.require(Capability::ReturnLoan)?;

    let record = state.services.loans.return_copy(record_id).await?;
    Ok(Json(record))
}

/// Lending history of a user
#[utoipa::path(
    get,
    path = "/borrow/user/{email}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("email" = String, Path, description = "User email")
    ),
    responses(
        (status = 200, description = "Borrow records, newest first", body = Vec<LoanView>),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "User not found")
    )
)]
pub async fn loans_for_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(email): Path<String>,
) -> AppResult<Json<Vec<LoanView>>> {
    session.require_self_or(&email, Capability::ViewAllLoans)?;

    let loans = state.services.loans.loans_for_user(&email).await?;
    Ok(Json(loans))
}

/// Lending history of a book
#[utoipa::path(
    get,
    path = "/borrow/book/{book_id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("book_id" = Uuid, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Borrow records, newest first", body = Vec<LoanView>),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn loans_for_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<Vec<LoanView>>> {
    session.require(Capability::ViewAllLoans)?;

    let loans = state.services.loans.loans_for_book(book_id).await?;
    Ok(Json(loans))
}

/// Every borrow record
#[utoipa::path(
    get,
    path = "/borrow/all",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrow records, newest first", body = Vec<LoanView>),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn all_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(session): AuthenticatedUser,
) -> AppResult<Json<Vec<LoanView>>> {
    session.require(Capability::ViewAllLoans)?;

    let loans = state.services.loans.all_loans().await?;
    Ok(Json(loans))
}
