//! Loans repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookMetadata, loan::NewBorrowRecord, Book, BorrowRecord, BorrowStatus, LoanView,
    },
};

use super::{LendingTx, LoansRepository};

const LOAN_VIEW_SELECT: &str = r#"
    SELECT r.id, r.book_id, b.title AS book_title, r.user_id,
           u.email AS user_email, u.first_name,
           r.borrow_date, r.due_date, r.return_date, r.status
    FROM borrow_records r
    JOIN books b ON b.id = r.book_id
    LEFT JOIN users u ON u.id = r.user_id
"#;

#[derive(Clone)]
pub struct PgLoansRepository {
    pool: Pool<Postgres>,
}

impl PgLoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoansRepository for PgLoansRepository {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>("SELECT * FROM borrow_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn count_active_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE user_id = $1 AND status = $2",
        )
        .bind(user_id)
        .bind(BorrowStatus::Borrowed)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn views_for_user(&self, user_id: Uuid) -> AppResult<Vec<LoanView>> {
        let query = format!("{} WHERE r.user_id = $1 ORDER BY r.borrow_date DESC, r.id DESC", LOAN_VIEW_SELECT);
        let views = sqlx::query_as::<_, LoanView>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(views)
    }

    async fn views_for_book(&self, book_id: Uuid) -> AppResult<Vec<LoanView>> {
        let query = format!("{} WHERE r.book_id = $1 ORDER BY r.borrow_date DESC, r.id DESC", LOAN_VIEW_SELECT);
        let views = sqlx::query_as::<_, LoanView>(&query)
            .bind(book_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(views)
    }

    async fn all_views(&self) -> AppResult<Vec<LoanView>> {
        let query = format!("{} ORDER BY r.borrow_date DESC, r.id DESC", LOAN_VIEW_SELECT);
        let views = sqlx::query_as::<_, LoanView>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(views)
    }

    async fn begin_lending(&self, book_id: Uuid) -> AppResult<Box<dyn LendingTx>> {
        let mut tx = self.pool.begin().await?;

        // Row lock held until commit or rollback; serializes every lending
        // transaction on this book.
        sqlx::query("SELECT id FROM books WHERE id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await?;

        Ok(Box::new(PgLendingTx { tx, book_id }))
    }
}

/// Lending transaction over a PostgreSQL transaction holding the book row lock
pub struct PgLendingTx {
    tx: Transaction<'static, Postgres>,
    book_id: Uuid,
}

#[async_trait]
impl LendingTx for PgLendingTx {
    fn book_id(&self) -> Uuid {
        self.book_id
    }

    async fn book(&mut self) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(self.book_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(book)
    }

    async fn save_copies(&mut self, total_copies: i32, available_copies: i32) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE books SET total_copies = $2, available_copies = $3 WHERE id = $1",
        )
        .bind(self.book_id)
        .bind(total_copies)
        .bind(available_copies)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", self.book_id)));
        }

        Ok(())
    }

    async fn save_metadata(&mut self, metadata: &BookMetadata) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET isbn = $2, title = $3, author = $4, publisher = $5, published_date = $6,
                categories = $7
            WHERE id = $1
            "#,
        )
        .bind(self.book_id)
        .bind(&metadata.isbn)
        .bind(&metadata.title)
        .bind(&metadata.author)
        .bind(&metadata.publisher)
        .bind(metadata.published_date)
        .bind(&metadata.categories)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", self.book_id)));
        }

        Ok(())
    }

    async fn active_loan(&mut self, user_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records WHERE user_id = $1 AND book_id = $2 AND status = $3",
        )
        .bind(user_id)
        .bind(self.book_id)
        .bind(BorrowStatus::Borrowed)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn record(&mut self, record_id: i64) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            "SELECT * FROM borrow_records WHERE id = $1 AND book_id = $2 FOR UPDATE",
        )
        .bind(record_id)
        .bind(self.book_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn insert_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        let result = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (user_id, book_id, borrow_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(record.user_id)
        .bind(record.book_id)
        .bind(record.borrow_date)
        .bind(record.due_date)
        .bind(BorrowStatus::Borrowed)
        .fetch_one(&mut *self.tx)
        .await;

        match result {
            Ok(created) => Ok(created),
            // Partial unique index on (user_id, book_id) for active records
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::AlreadyBorrowed),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        sqlx::query("UPDATE borrow_records SET return_date = $2, status = $3 WHERE id = $1")
            .bind(record.id)
            .bind(record.return_date)
            .bind(record.status)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
