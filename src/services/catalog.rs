//! Catalog service for book management

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{CreateBook, NewBook, UpdateBook},
        Book,
    },
    repository::Repository,
};

use super::inventory::InventoryLedger;

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Books that have not been deleted, optionally only one category
    pub async fn list_books(&self, category: Option<&str>) -> AppResult<Vec<Book>> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        self.repository.books.list_active(category).await
    }

    /// Get a book; deleted books are reported as missing
    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        match self.repository.books.get_by_id(id).await? {
            Some(book) if !book.deleted => Ok(book),
            _ => Err(AppError::NotFound(format!("Book with id {} not found", id))),
        }
    }

    /// Create a book with all its copies available
    pub async fn create_book(&self, book: CreateBook) -> AppResult<Book> {
        book.validate()?;
        let created = self.repository.books.create(NewBook::from(book)).await?;
        tracing::info!("Created book {} ({} copies)", created.id, created.total_copies);
        Ok(created)
    }

    /// Update metadata and, when given, the number of owned copies.
    /// Both are read and written under the book's lending lock and commit
    /// together.
    pub async fn update_book(&self, id: Uuid, update: UpdateBook) -> AppResult<Book> {
        update.validate()?;

        let mut tx = self.repository.loans.begin_lending(id).await?;
        let current = match tx.book().await? {
            Some(book) if !book.deleted => book,
            _ => return Err(AppError::NotFound(format!("Book with id {} not found", id))),
        };

        if let Some(new_total) = update.total_copies {
            InventoryLedger::resize(&mut *tx, new_total).await?;
        }
        tx.save_metadata(&update.apply_to(&current)).await?;

        let updated = tx
            .book()
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        tx.commit().await?;

        tracing::info!("Updated book {}", id);
        Ok(updated)
    }

    /// Soft delete: hidden from the catalog, kept for loan history
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.soft_delete(id).await?;
        tracing::info!("Deleted book {}", id);
        Ok(())
    }
}
