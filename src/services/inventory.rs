//! Copy counters of a book
//!
//! Every change to `available_copies` or `total_copies` goes through this
//! module, inside a [`LendingTx`] that holds the book's exclusive lock.
//! `0 <= available_copies <= total_copies` holds after every operation.

use crate::{
    error::{AppError, AppResult},
    models::Book,
    repository::LendingTx,
};

/// Take one copy off the shelf
pub fn take_copy(book: &mut Book) -> AppResult<()> {
    if book.available_copies <= 0 {
        return Err(AppError::Unavailable(format!(
            "No copies of '{}' are available",
            book.title
        )));
    }
    book.available_copies -= 1;
    Ok(())
}

/// Put one copy back on the shelf
pub fn restore_copy(book: &mut Book) -> AppResult<()> {
    if book.available_copies >= book.total_copies {
        // Only reachable if a Borrowed record exists without a matching
        // decrement; refuse rather than exceed the total.
        tracing::error!(
            "Copy counter of book {} already at total ({}), refusing release",
            book.id,
            book.total_copies
        );
        return Err(AppError::Internal(format!(
            "Copy counter of book {} would exceed its total",
            book.id
        )));
    }
    book.available_copies += 1;
    Ok(())
}

/// Change the number of owned copies, keeping copies on loan unchanged
pub fn resize_copies(book: &mut Book, new_total: i32) -> AppResult<()> {
    if new_total < 0 {
        return Err(AppError::Validation(
            "Total copies cannot be negative".to_string(),
        ));
    }
    let on_loan = book.copies_on_loan();
    if new_total < on_loan {
        return Err(AppError::Validation(format!(
            "Total copies cannot be lower than the {} copies on loan",
            on_loan
        )));
    }
    book.total_copies = new_total;
    book.available_copies = new_total - on_loan;
    Ok(())
}

/// Counter operations applied through a lending transaction
pub struct InventoryLedger;

impl InventoryLedger {
    /// Decrement `available_copies` by one, or fail with `Unavailable`
    pub async fn reserve_copy(tx: &mut dyn LendingTx) -> AppResult<Book> {
        Self::apply(tx, take_copy).await
    }

    /// Increment `available_copies` by one
    pub async fn release_copy(tx: &mut dyn LendingTx) -> AppResult<Book> {
        Self::apply(tx, restore_copy).await
    }

    pub async fn resize(tx: &mut dyn LendingTx, new_total: i32) -> AppResult<Book> {
        Self::apply(tx, |book| resize_copies(book, new_total)).await
    }

    async fn apply<F>(tx: &mut dyn LendingTx, change: F) -> AppResult<Book>
    where
        F: FnOnce(&mut Book) -> AppResult<()> + Send,
    {
        let mut book = tx
            .book()
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", tx.book_id())))?;

        change(&mut book)?;
        tx.save_copies(book.total_copies, book.available_copies).await?;

        Ok(book)
    }
}
