//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::NewBook,
        Book,
    },
};

use super::BooksRepository;

#[derive(Clone)]
pub struct PgBooksRepository {
    pool: Pool<Postgres>,
}

impl PgBooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksRepository for PgBooksRepository {
    async fn list_active(&self, category: Option<&str>) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE deleted = FALSE
              AND ($1::TEXT IS NULL
                   OR EXISTS (SELECT 1 FROM unnest(categories) c WHERE LOWER(c) = LOWER(TRIM($1))))
            ORDER BY title, id
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(book)
    }

    async fn create(&self, book: NewBook) -> AppResult<Book> {
        let metadata = &book.metadata;
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                id, isbn, title, author, publisher, published_date, categories,
                total_copies, available_copies, deleted
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&metadata.isbn)
        .bind(&metadata.title)
        .bind(&metadata.author)
        .bind(&metadata.publisher)
        .bind(metadata.published_date)
        .bind(&metadata.categories)
        .bind(book.total_copies)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("UPDATE books SET deleted = TRUE WHERE id = $1 AND deleted = FALSE")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}
