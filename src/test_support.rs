//! Fixtures shared by the unit tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppResult,
    models::{
        book::{BookMetadata, NewBook},
        user::NewUser,
        Book, Role, User,
    },
    repository::Repository,
    services::{
        credentials::CredentialLifecycle, email::Notifier, password::Passwords, Services,
        SharedClock,
    },
};

/// Clock that only moves when told to
pub struct FixtureClock(Mutex<DateTime<Utc>>);

impl FixtureClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        *self.0.lock().unwrap() += delta;
    }
}

impl Default for FixtureClock {
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
    }
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Notifier keeping every message as (to, subject, body)
#[derive(Default)]
pub struct RecordingNotifier(Mutex<Vec<(String, String, String)>>);

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        self.0
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Default configuration with cheap password hashing
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "test-secret".to_string();
    config.auth.password_hash_memory_kib = 8;
    config.auth.password_hash_iterations = 1;
    config
}

/// In-memory services driven by a [`FixtureClock`]
pub struct Fixture {
    pub config: AppConfig,
    pub repository: Repository,
    pub clock: Arc<FixtureClock>,
    pub services: Services,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_notifier(Arc::new(RecordingNotifier::default()))
    }

    pub fn with_notifier(notifier: Arc<dyn Notifier>) -> Self {
        let config = test_config();
        let repository = Repository::in_memory();
        let clock = Arc::new(FixtureClock::default());
        let services = Services::new(repository.clone(), &config, notifier, clock.clone()).unwrap();

        Self {
            config,
            repository,
            clock,
            services,
        }
    }

    pub fn passwords(&self) -> Passwords {
        Passwords::new(&self.config.auth).unwrap()
    }

    pub fn credentials(&self) -> CredentialLifecycle {
        let clock: SharedClock = self.clock.clone();
        CredentialLifecycle::new(
            self.repository.users.clone(),
            self.passwords(),
            clock,
            Duration::minutes(self.config.credentials.reset_otp_minutes),
        )
    }

    /// Insert a user whose password is "password"
    pub async fn seed_user(&self, email: &str, role: Role, enabled: bool) -> User {
        self.repository
            .users
            .create(NewUser {
                email: email.to_string(),
                password_hash: self.passwords().hash("password").unwrap(),
                first_name: Some("Test".to_string()),
                last_name: None,
                role,
                enabled,
                verification_code: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_book(&self, title: &str, copies: i32) -> Book {
        self.repository
            .books
            .create(NewBook {
                metadata: BookMetadata {
                    title: title.to_string(),
                    ..Default::default()
                },
                total_copies: copies,
            })
            .await
            .unwrap()
    }

    pub async fn user(&self, email: &str) -> User {
        self.repository.users.get_by_email(email).await.unwrap().unwrap()
    }

    pub async fn book(&self, id: Uuid) -> Book {
        self.repository.books.get_by_id(id).await.unwrap().unwrap()
    }
}
