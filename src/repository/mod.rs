//! Repository layer: record store contracts and their backends
//!
//! Services only see the traits below. Two backends implement them:
//! PostgreSQL (`books`, `users`, `loans`) and a process-local store
//! (`memory`) used for development and tests.

pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{BookMetadata, NewBook},
        loan::NewBorrowRecord,
        user::NewUser,
        Book, BorrowRecord, LoanView, User,
    },
};

/// Catalog storage. Counters and metadata of an existing book are only
/// written through [`LendingTx`].
#[async_trait]
pub trait BooksRepository: Send + Sync {
    /// Books that are not soft-deleted, ordered by title, optionally only
    /// those tagged with `category` (ignoring case)
    async fn list_active(&self, category: Option<&str>) -> AppResult<Vec<Book>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Book>>;

    /// Insert a book with every copy available
    async fn create(&self, book: NewBook) -> AppResult<Book>;

    async fn soft_delete(&self, id: Uuid) -> AppResult<()>;
}

/// User storage
#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn list(&self) -> AppResult<Vec<User>>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Case-insensitive lookup
    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn get_by_verification_code(&self, code: &str) -> AppResult<Option<User>>;

    /// Fails with `Conflict` when the email is already registered
    async fn create(&self, user: NewUser) -> AppResult<User>;

    /// Versioned save: succeeds only if `user.version` still matches the
    /// stored version, otherwise fails with `StaleRecord`. Returns the user
    /// with its new version.
    async fn save(&self, user: &User) -> AppResult<User>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

/// Borrow record storage and the lending unit of work
#[async_trait]
pub trait LoansRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> AppResult<Option<BorrowRecord>>;

    async fn count_active_for_user(&self, user_id: Uuid) -> AppResult<i64>;

    async fn views_for_user(&self, user_id: Uuid) -> AppResult<Vec<LoanView>>;

    async fn views_for_book(&self, book_id: Uuid) -> AppResult<Vec<LoanView>>;

    async fn all_views(&self) -> AppResult<Vec<LoanView>>;

    /// Open a lending transaction holding the exclusive lock of `book_id`.
    /// Waits while another transaction holds that lock.
    async fn begin_lending(&self, book_id: Uuid) -> AppResult<Box<dyn LendingTx>>;
}

/// Exclusive unit of work over one book's counters and borrow records.
///
/// Reads observe the transaction's own writes. Nothing is visible to other
/// callers before [`LendingTx::commit`]; dropping the transaction discards
/// every write.
#[async_trait]
pub trait LendingTx: Send {
    fn book_id(&self) -> Uuid;

    async fn book(&mut self) -> AppResult<Option<Book>>;

    async fn save_copies(&mut self, total_copies: i32, available_copies: i32) -> AppResult<()>;

    async fn save_metadata(&mut self, metadata: &BookMetadata) -> AppResult<()>;

    /// The `Borrowed` record of `user_id` for this book, if any
    async fn active_loan(&mut self, user_id: Uuid) -> AppResult<Option<BorrowRecord>>;

    /// A record of this book by id
    async fn record(&mut self, record_id: i64) -> AppResult<Option<BorrowRecord>>;

    async fn insert_record(&mut self, record: NewBorrowRecord) -> AppResult<BorrowRecord>;

    async fn save_record(&mut self, record: &BorrowRecord) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Main repository struct holding one handle per store contract
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BooksRepository>,
    pub users: Arc<dyn UsersRepository>,
    pub loans: Arc<dyn LoansRepository>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::PgBooksRepository::new(pool.clone())),
            users: Arc::new(users::PgUsersRepository::new(pool.clone())),
            loans: Arc::new(loans::PgLoansRepository::new(pool)),
        }
    }

    /// Create a repository keeping everything in process memory
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::default();
        Self {
            books: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            loans: Arc::new(store),
        }
    }
}
