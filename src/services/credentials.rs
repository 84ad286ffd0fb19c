//! Single-use credentials: email verification codes and password reset OTPs
//!
//! Every change goes through a versioned save of the user record. A save that
//! loses a race reloads the user and re-checks its preconditions, so a code
//! can be consumed at most once.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use rand::Rng;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::User,
    repository::UsersRepository,
};

use super::{password::Passwords, SharedClock};

const MAX_SAVE_ATTEMPTS: usize = 3;

enum UserLookup<'a> {
    Id(Uuid),
    Email(&'a str),
    VerificationCode(&'a str),
}

/// Fresh unguessable verification code
pub fn generate_verification_code() -> String {
    Uuid::new_v4().to_string()
}

/// Six-digit numeric one-time code
fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

fn check_reset_otp(user: &User, otp: &str, now: DateTime<Utc>) -> AppResult<()> {
    if user.reset_otp.as_deref() != Some(otp) {
        return Err(AppError::InvalidOtp);
    }
    match user.reset_otp_expiry {
        Some(expiry) if now <= expiry => Ok(()),
        _ => Err(AppError::Expired),
    }
}

#[derive(Clone)]
pub struct CredentialLifecycle {
    users: Arc<dyn UsersRepository>,
    passwords: Passwords,
    clock: SharedClock,
    reset_otp_ttl: Duration,
}

impl CredentialLifecycle {
    pub fn new(
        users: Arc<dyn UsersRepository>,
        passwords: Passwords,
        clock: SharedClock,
        reset_otp_ttl: Duration,
    ) -> Self {
        Self {
            users,
            passwords,
            clock,
            reset_otp_ttl,
        }
    }

    /// Store a new verification code on the user, replacing any previous one
    pub async fn issue_verification_code(&self, user: &User) -> AppResult<String> {
        let code = generate_verification_code();
        self.update_user(UserLookup::Id(user.id), |u| {
            u.verification_code = Some(code.clone());
            Ok(())
        })
        .await?;

        Ok(code)
    }

    /// Enable the account owning `code` and clear the code
    pub async fn consume_verification_code(&self, code: &str) -> AppResult<User> {
        let user = self
            .update_user(UserLookup::VerificationCode(code), |u| {
                u.enabled = true;
                u.verification_code = None;
                Ok(())
            })
            .await?;

        tracing::info!("Email verified for user {}", user.id);
        Ok(user)
    }

    /// Generate a reset OTP for `email`, overwriting any pending one
    pub async fn issue_reset_otp(&self, email: &str) -> AppResult<(User, String)> {
        let otp = generate_otp();
        let expiry = self.clock.utc() + self.reset_otp_ttl;

        let user = self
            .update_user(UserLookup::Email(email), |u| {
                u.reset_otp = Some(otp.clone());
                u.reset_otp_expiry = Some(expiry);
                Ok(())
            })
            .await?;

        Ok((user, otp))
    }

    /// Replace the password if `otp` matches the pending, unexpired code.
    /// The code is checked before the new password is hashed.
    pub async fn consume_reset_otp(&self, email: &str, otp: &str, new_password: &str) -> AppResult<()> {
        let now = self.clock.utc();
        let pending = self.load(&UserLookup::Email(email)).await?;
        check_reset_otp(&pending, otp, now)?;

        let new_hash = self.passwords.hash(new_password)?;
        let user = self
            .update_user(UserLookup::Email(email), |u| {
                check_reset_otp(u, otp, now)?;
                u.password_hash = new_hash.clone();
                u.reset_otp = None;
                u.reset_otp_expiry = None;
                Ok(())
            })
            .await?;

        tracing::info!("Password reset for user {}", user.id);
        Ok(())
    }

    /// Replace the password after checking the current one
    pub async fn change_password(&self, email: &str, old_password: &str, new_password: &str) -> AppResult<()> {
        let new_hash = self.passwords.hash(new_password)?;

        let user = self
            .update_user(UserLookup::Email(email), |u| {
                if !self.passwords.verify(old_password, &u.password_hash)? {
                    return Err(AppError::InvalidCredentials);
                }
                u.password_hash = new_hash.clone();
                Ok(())
            })
            .await?;

        tracing::info!("Password changed for user {}", user.id);
        Ok(())
    }

    /// Flip the session presence flag; has no effect on issued tokens
    pub async fn mark_session(&self, email: &str, active: bool) -> AppResult<()> {
        self.update_user(UserLookup::Email(email), |u| {
            u.active = active;
            Ok(())
        })
        .await?;

        Ok(())
    }

    async fn load(&self, lookup: &UserLookup<'_>) -> AppResult<User> {
        match lookup {
            UserLookup::Id(id) => self
                .users
                .get_by_id(*id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id))),
            UserLookup::Email(email) => self
                .users
                .get_by_email(email)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("User with email {} not found", email))),
            UserLookup::VerificationCode(code) => self
                .users
                .get_by_verification_code(code)
                .await?
                .ok_or(AppError::InvalidCode),
        }
    }

    /// Load, modify and save a user, retrying on concurrent modification.
    /// `apply` runs against the freshly loaded record on every attempt.
    async fn update_user<F>(&self, lookup: UserLookup<'_>, mut apply: F) -> AppResult<User>
    where
        F: FnMut(&mut User) -> AppResult<()> + Send,
    {
        let mut attempt = 1;
        loop {
            let mut user = self.load(&lookup).await?;
            apply(&mut user)?;

            match self.users.save(&user).await {
                Err(AppError::StaleRecord) if attempt < MAX_SAVE_ATTEMPTS => {
                    tracing::debug!("User {} modified concurrently, retrying", user.id);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
