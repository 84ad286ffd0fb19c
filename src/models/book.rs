//! Book (catalog entry) model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Book with its physical copy counters
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub isbn: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    /// Category tags, unique ignoring case
    pub categories: Vec<String>,
    pub total_copies: i32,
    /// Copies currently lendable, always within `0..=total_copies`
    pub available_copies: i32,
    /// Soft-delete flag; deleted books stay referenced by borrow records
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn copies_on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}

/// Trim tags, drop blank ones and duplicates (ignoring case), sort them
pub fn normalize_categories(raw: Vec<String>) -> Vec<String> {
    let mut categories: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !categories.iter().any(|c| c.eq_ignore_ascii_case(tag)) {
            categories.push(tag.to_string());
        }
    }
    categories.sort_by_key(|c| c.to_lowercase());
    categories
}

/// Descriptive fields, editable without touching the copy counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BookMetadata {
    pub isbn: Option<String>,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub categories: Vec<String>,
}

/// Insert payload for a new book
#[derive(Debug, Clone)]
pub struct NewBook {
    pub metadata: BookMetadata,
    pub total_copies: i32,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    pub isbn: Option<String>,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: i32,
}

impl From<CreateBook> for NewBook {
    fn from(book: CreateBook) -> Self {
        NewBook {
            metadata: BookMetadata {
                isbn: book.isbn,
                title: book.title,
                author: book.author,
                publisher: book.publisher,
                published_date: book.published_date,
                categories: normalize_categories(book.categories),
            },
            total_copies: book.total_copies,
        }
    }
}

/// Update book request; absent fields keep their current value
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    pub isbn: Option<String>,
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<NaiveDate>,
    /// Replaces the whole tag list when present
    pub categories: Option<Vec<String>>,
    #[validate(range(min = 0, message = "Total copies cannot be negative"))]
    pub total_copies: Option<i32>,
}

impl UpdateBook {
    /// Merge the request over the current metadata
    pub fn apply_to(&self, current: &Book) -> BookMetadata {
        BookMetadata {
            isbn: self.isbn.clone().or_else(|| current.isbn.clone()),
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            author: self.author.clone().or_else(|| current.author.clone()),
            publisher: self.publisher.clone().or_else(|| current.publisher.clone()),
            published_date: self.published_date.or(current.published_date),
            categories: match &self.categories {
                Some(categories) => normalize_categories(categories.clone()),
                None => current.categories.clone(),
            },
        }
    }
}
