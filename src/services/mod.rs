//! Business logic services

pub mod catalog;
pub mod credentials;
pub mod email;
pub mod inventory;
pub mod loans;
pub mod password;
pub mod tokens;
pub mod users;

use std::sync::Arc;

use chrono::Duration;
use mockable::Clock;

use crate::{config::AppConfig, error::AppResult, repository::Repository};

/// Time source shared by every service
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub users: users::UsersService,
    pub tokens: tokens::TokenCodec,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        notifier: Arc<dyn email::Notifier>,
        clock: SharedClock,
    ) -> AppResult<Self> {
        let passwords = password::Passwords::new(&config.auth)?;
        let tokens = tokens::TokenCodec::new(
            &config.auth.jwt_secret,
            Duration::hours(config.auth.jwt_expiration_hours),
            clock.clone(),
        );
        let credentials = credentials::CredentialLifecycle::new(
            repository.users.clone(),
            passwords.clone(),
            clock.clone(),
            Duration::minutes(config.credentials.reset_otp_minutes),
        );

        Ok(Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(
                repository.clone(),
                clock,
                Duration::days(config.lending.loan_days),
            ),
            users: users::UsersService::new(
                repository,
                credentials,
                passwords,
                tokens.clone(),
                notifier,
                config.auth.verification_base_url.clone(),
                config.credentials.reset_otp_minutes,
            ),
            tokens,
        })
    }
}
