//! Process-local record store
//!
//! Same contracts as the PostgreSQL backend. Lending transactions take a
//! per-book `tokio` mutex for their whole lifetime and stage their writes,
//! applying them in one step at commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookMetadata, NewBook},
        loan::NewBorrowRecord,
        user::NewUser,
        Book, BorrowRecord, BorrowStatus, LoanView, User,
    },
};

use super::{BooksRepository, LendingTx, LoansRepository, UsersRepository};

#[derive(Default)]
struct State {
    books: HashMap<Uuid, Book>,
    users: HashMap<Uuid, User>,
    records: BTreeMap<i64, BorrowRecord>,
    next_record_id: i64,
    book_locks: HashMap<Uuid, Arc<AsyncMutex<()>>>,
}

impl State {
    fn view(&self, record: &BorrowRecord) -> LoanView {
        let user = self.users.get(&record.user_id);
        LoanView {
            id: record.id,
            book_id: record.book_id,
            book_title: self
                .books
                .get(&record.book_id)
                .map(|b| b.title.clone())
                .unwrap_or_default(),
            user_id: record.user_id,
            user_email: user.map(|u| u.email.clone()),
            first_name: user.and_then(|u| u.first_name.clone()),
            borrow_date: record.borrow_date,
            due_date: record.due_date,
            return_date: record.return_date,
            status: record.status,
        }
    }

    fn views<F>(&self, filter: F) -> Vec<LoanView>
    where
        F: Fn(&BorrowRecord) -> bool,
    {
        let mut views: Vec<LoanView> = self
            .records
            .values()
            .filter(|r| filter(r))
            .map(|r| self.view(r))
            .collect();
        views.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        views
    }
}

/// In-memory backend; clones share the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    fn state(&self) -> AppResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl BooksRepository for MemoryStore {
    async fn list_active(&self, category: Option<&str>) -> AppResult<Vec<Book>> {
        let state = self.state()?;
        let mut books: Vec<Book> = state
            .books
            .values()
            .filter(|b| !b.deleted && category.map_or(true, |c| b.has_category(c)))
            .cloned()
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Book>> {
        Ok(self.state()?.books.get(&id).cloned())
    }

    async fn create(&self, book: NewBook) -> AppResult<Book> {
        let NewBook {
            metadata,
            total_copies,
        } = book;
        let created = Book {
            id: Uuid::new_v4(),
            isbn: metadata.isbn,
            title: metadata.title,
            author: metadata.author,
            publisher: metadata.publisher,
            published_date: metadata.published_date,
            categories: metadata.categories,
            total_copies,
            available_copies: total_copies,
            deleted: false,
            created_at: Utc::now(),
        };
        self.state()?.books.insert(created.id, created.clone());
        Ok(created)
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state()?;
        match state.books.get_mut(&id) {
            Some(book) if !book.deleted => {
                book.deleted = true;
                Ok(())
            }
            _ => Err(AppError::NotFound(format!("Book with id {} not found", id))),
        }
    }
}

#[async_trait]
impl UsersRepository for MemoryStore {
    async fn list(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.state()?.users.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_by_verification_code(&self, code: &str) -> AppResult<Option<User>> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.verification_code.as_deref() == Some(code))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut state = self.state()?;
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            enabled: user.enabled,
            active: false,
            verification_code: user.verification_code,
            reset_otp: None,
            reset_otp_expiry: None,
            created_at: Utc::now(),
            version: 1,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn save(&self, user: &User) -> AppResult<User> {
        let mut state = self.state()?;
        let stored = state.users.get_mut(&user.id).ok_or(AppError::StaleRecord)?;
        if stored.version != user.version {
            return Err(AppError::StaleRecord);
        }

        let mut saved = user.clone();
        saved.email = stored.email.clone();
        saved.created_at = stored.created_at;
        saved.version = stored.version + 1;
        *stored = saved.clone();
        Ok(saved)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.state()?
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }
}

#[async_trait]
impl LoansRepository for MemoryStore {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state()?.records.get(&id).cloned())
    }

    async fn count_active_for_user(&self, user_id: Uuid) -> AppResult<i64> {
        let count = self
            .state()?
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.is_active())
            .count();
        Ok(count as i64)
    }

    async fn views_for_user(&self, user_id: Uuid) -> AppResult<Vec<LoanView>> {
        Ok(self.state()?.views(|r| r.user_id == user_id))
    }

    async fn views_for_book(&self, book_id: Uuid) -> AppResult<Vec<LoanView>> {
        Ok(self.state()?.views(|r| r.book_id == book_id))
    }

    async fn all_views(&self) -> AppResult<Vec<LoanView>> {
        Ok(self.state()?.views(|_| true))
    }

    async fn begin_lending(&self, book_id: Uuid) -> AppResult<Box<dyn LendingTx>> {
        // Books are never removed, so locks exist only for stored ids and
        // the lock map stays bounded by the catalog size.
        let lock = {
            let mut state = self.state()?;
            if state.books.contains_key(&book_id) {
                Some(state.book_locks.entry(book_id).or_default().clone())
            } else {
                None
            }
        };
        let guard = match lock {
            Some(lock) => Some(lock.lock_owned().await),
            None => None,
        };

        Ok(Box::new(MemoryLendingTx {
            store: self.clone(),
            book_id,
            guard,
            copies: None,
            metadata: None,
            staged: BTreeMap::new(),
        }))
    }
}

/// Lending transaction holding one book's mutex, with staged writes.
/// Opened for an unknown book it holds no lock and refuses every write.
pub struct MemoryLendingTx {
    store: MemoryStore,
    book_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    copies: Option<(i32, i32)>,
    metadata: Option<BookMetadata>,
    staged: BTreeMap<i64, BorrowRecord>,
}

impl MemoryLendingTx {
    fn ensure_locked(&self) -> AppResult<()> {
        match self.guard {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("Book with id {} not found", self.book_id))),
        }
    }

    /// Records of this book as this transaction sees them
    fn records(&self) -> AppResult<Vec<BorrowRecord>> {
        let state = self.store.state()?;
        let mut merged: BTreeMap<i64, BorrowRecord> = state
            .records
            .values()
            .filter(|r| r.book_id == self.book_id)
            .map(|r| (r.id, r.clone()))
            .collect();
        merged.extend(self.staged.iter().map(|(id, r)| (*id, r.clone())));
        Ok(merged.into_values().collect())
    }
}

#[async_trait]
impl LendingTx for MemoryLendingTx {
    fn book_id(&self) -> Uuid {
        self.book_id
    }

    async fn book(&mut self) -> AppResult<Option<Book>> {
        if self.guard.is_none() {
            return Ok(None);
        }
        let mut book = self.store.state()?.books.get(&self.book_id).cloned();
        if let Some(book) = book.as_mut() {
            if let Some((total, available)) = self.copies {
                book.total_copies = total;
                book.available_copies = available;
            }
            if let Some(metadata) = &self.metadata {
                apply_metadata(book, metadata);
            }
        }
        Ok(book)
    }

    async fn save_copies(&mut self, total_copies: i32, available_copies: i32) -> AppResult<()> {
        self.ensure_locked()?;
        self.copies = Some((total_copies, available_copies));
        Ok(())
    }

    async fn save_metadata(&mut self, metadata: &BookMetadata) -> AppResult<()> {
        self.ensure_locked()?;
        self.metadata = Some(metadata.clone());
        Ok(())
    }

    async fn active_loan(&mut self, user_id: Uuid) -> AppResult<Option<BorrowRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|r| r.user_id == user_id && r.is_active()))
    }

    async fn record(&mut self, record_id: i64) -> AppResult<Option<BorrowRecord>> {
        Ok(self.records()?.into_iter().find(|r| r.id == record_id))
    }

    async fn insert_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord> {
        self.ensure_locked()?;
        if record.book_id != self.book_id {
            return Err(AppError::Internal("borrow record for another book".to_string()));
        }
        if self.active_loan(record.user_id).await?.is_some() {
            return Err(AppError::AlreadyBorrowed);
        }

        let id = {
            let mut state = self.store.state()?;
            state.next_record_id += 1;
            state.next_record_id
        };
        let created = BorrowRecord {
            id,
            user_id: record.user_id,
            book_id: record.book_id,
            borrow_date: record.borrow_date,
            due_date: record.due_date,
            return_date: None,
            status: BorrowStatus::Borrowed,
        };
        self.staged.insert(id, created.clone());
        Ok(created)
    }

    async fn save_record(&mut self, record: &BorrowRecord) -> AppResult<()> {
        self.ensure_locked()?;
        if record.book_id != self.book_id {
            return Err(AppError::Internal("borrow record for another book".to_string()));
        }
        self.staged.insert(record.id, record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        let mut state = this.store.state()?;

        if let Some((total, available)) = this.copies {
            if available < 0 || available > total {
                return Err(AppError::Internal(format!(
                    "copy counters out of range for book {}: {}/{}",
                    this.book_id, available, total
                )));
            }
        }

        if this.copies.is_some() || this.metadata.is_some() {
            let book = state
                .books
                .get_mut(&this.book_id)
                .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", this.book_id)))?;
            if let Some((total, available)) = this.copies {
                book.total_copies = total;
                book.available_copies = available;
            }
            if let Some(metadata) = &this.metadata {
                apply_metadata(book, metadata);
            }
        }

        state.records.extend(this.staged);
        Ok(())
    }
}

fn apply_metadata(book: &mut Book, metadata: &BookMetadata) {
    book.isbn = metadata.isbn.clone();
    book.title = metadata.title.clone();
    book.author = metadata.author.clone();
    book.publisher = metadata.publisher.clone();
    book.published_date = metadata.published_date;
    book.categories = metadata.categories.clone();
}
