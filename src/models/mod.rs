//! Data models for Librario

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use loan::{BorrowRecord, BorrowStatus, LoanView};
pub use user::{Capability, Role, User};
