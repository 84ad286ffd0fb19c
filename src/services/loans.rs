//! Borrow and return of book copies
//!
//! A (user, book) pair is either free or on loan through exactly one
//! `Borrowed` record. Both transitions run inside one lending transaction,
//! so the duplicate check, the availability check, the counter change and
//! the record write are indivisible for a given book.

use chrono::Duration;
use mockable::Clock;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{loan::NewBorrowRecord, BorrowRecord, BorrowStatus, LoanView, User},
    repository::Repository,
};

use super::{inventory::InventoryLedger, SharedClock};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    clock: SharedClock,
    loan_period: Duration,
}

impl LoansService {
    pub fn new(repository: Repository, clock: SharedClock, loan_period: Duration) -> Self {
        Self {
            repository,
            clock,
            loan_period,
        }
    }

    /// Lend one copy of `book_id` to the user registered under `email`
    pub async fn borrow(&self, book_id: Uuid, email: &str) -> AppResult<BorrowRecord> {
        let user = self.user_by_email(email).await?;

        let mut tx = self.repository.loans.begin_lending(book_id).await?;

        match tx.book().await? {
            Some(book) if !book.deleted => {}
            _ => return Err(AppError::NotFound(format!("Book with id {} not found", book_id))),
        }

        if tx.active_loan(user.id).await?.is_some() {
            return Err(AppError::AlreadyBorrowed);
        }

        let book = InventoryLedger::reserve_copy(&mut *tx).await?;

        let now = self.clock.utc();
        let record = tx
            .insert_record(NewBorrowRecord {
                user_id: user.id,
                book_id,
                borrow_date: now,
                due_date: now + self.loan_period,
            })
            .await?;

        tx.commit().await?;

        tracing::info!(
            "User {} borrowed book {} (record {}, {} of {} copies left)",
            user.id,
            book_id,
            record.id,
            book.available_copies,
            book.total_copies
        );
        Ok(record)
    }

    /// Close an active borrow record and put its copy back
    pub async fn return_copy(&self, record_id: i64) -> AppResult<BorrowRecord> {
        let book_id = self
            .repository
            .loans
            .get_by_id(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", record_id)))?
            .book_id;

        let mut tx = self.repository.loans.begin_lending(book_id).await?;

        // Re-read under the book lock; a concurrent return may have won
        let mut record = tx
            .record(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow record with id {} not found", record_id)))?;

        if record.status == BorrowStatus::Returned {
            return Err(AppError::AlreadyReturned);
        }

        record.status = BorrowStatus::Returned;
        record.return_date = Some(self.clock.utc());
        tx.save_record(&record).await?;

        InventoryLedger::release_copy(&mut *tx).await?;

        tx.commit().await?;

        tracing::info!("Borrow record {} returned (book {})", record.id, book_id);
        Ok(record)
    }

    /// Lending history of one user, newest first
    pub async fn loans_for_user(&self, email: &str) -> AppResult<Vec<LoanView>> {
        let user = self.user_by_email(email).await?;
        self.repository.loans.views_for_user(user.id).await
    }

    /// Lending history of one book, newest first
    pub async fn loans_for_book(&self, book_id: Uuid) -> AppResult<Vec<LoanView>> {
        self.repository
            .books
            .get_by_id(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        self.repository.loans.views_for_book(book_id).await
    }

    pub async fn all_loans(&self) -> AppResult<Vec<LoanView>> {
        self.repository.loans.all_views().await
    }

    async fn user_by_email(&self, email: &str) -> AppResult<User> {
        self.repository
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with email {} not found", email)))
    }
}
