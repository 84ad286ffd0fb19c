//! Librario Library Lending Server
//!
//! REST JSON API for a small library: a book catalog with physical copy
//! counters, member borrowing and returning, and account credentials
//! (email verification, password reset codes, session tokens).

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
