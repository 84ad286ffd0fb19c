//! Authentication and user management service

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    config::BootstrapConfig,
    error::{AppError, AppResult},
    models::{
        user::{LoginResponse, NewUser, RegisterRequest},
        Role, User,
    },
    repository::Repository,
};

use super::{
    credentials::{generate_verification_code, CredentialLifecycle},
    email::{deliver_best_effort, reset_otp_message, verification_message, Notifier},
    password::Passwords,
    tokens::TokenCodec,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    credentials: CredentialLifecycle,
    passwords: Passwords,
    tokens: TokenCodec,
    notifier: Arc<dyn Notifier>,
    verification_base_url: String,
    reset_otp_minutes: i64,
}

impl UsersService {
    pub fn new(
        repository: Repository,
        credentials: CredentialLifecycle,
        passwords: Passwords,
        tokens: TokenCodec,
        notifier: Arc<dyn Notifier>,
        verification_base_url: String,
        reset_otp_minutes: i64,
    ) -> Self {
        Self {
            repository,
            credentials,
            passwords,
            tokens,
            notifier,
            verification_base_url,
            reset_otp_minutes,
        }
    }

    /// Register a member account, disabled until its email is verified.
    /// A failed verification email does not undo the registration.
    pub async fn register(&self, request: RegisterRequest) -> AppResult<User> {
        request.validate()?;

        if self.repository.users.get_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let code = generate_verification_code();
        let user = self
            .repository
            .users
            .create(NewUser {
                email: request.email,
                password_hash: self.passwords.hash(&request.password)?,
                first_name: request.first_name,
                last_name: request.last_name,
                role: Role::Member,
                enabled: false,
                verification_code: Some(code.clone()),
            })
            .await?;

        tracing::info!("Registered user {} ({})", user.id, user.email);
        self.send_verification(&user.email, &code).await;

        Ok(user)
    }

    /// Check credentials and issue a session token
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        let user = self
            .repository
            .users
            .get_by_email(email)
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !self.passwords.verify(password, &user.password_hash)? {
            return Err(AppError::InvalidCredentials);
        }

        if !user.enabled {
            return Err(AppError::NotVerified);
        }

        let token = self.tokens.issue_session(&user.email, user.role)?;
        self.credentials.mark_session(&user.email, true).await?;

        tracing::info!("User {} logged in", user.id);
        Ok(LoginResponse {
            token,
            role: user.role,
            first_name: user.first_name,
            email: user.email,
        })
    }

    /// Clear the session presence flag; issued tokens stay valid until expiry
    pub async fn logout(&self, email: &str) -> AppResult<()> {
        self.credentials.mark_session(email, false).await
    }

    pub async fn verify_email(&self, code: &str) -> AppResult<User> {
        self.credentials.consume_verification_code(code).await
    }

    /// Issue a fresh verification code for an account that is not yet enabled
    pub async fn resend_verification(&self, email: &str) -> AppResult<()> {
        let user = self.get_by_email(email).await?;
        if user.enabled {
            return Err(AppError::BusinessRule("Email is already verified".to_string()));
        }

        let code = self.credentials.issue_verification_code(&user).await?;
        self.send_verification(&user.email, &code).await;
        Ok(())
    }

    /// Issue a reset OTP and send it by email
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let (user, otp) = self.credentials.issue_reset_otp(email).await?;

        let (subject, body) = reset_otp_message(&otp, self.reset_otp_minutes);
        deliver_best_effort(self.notifier.as_ref(), &user.email, &subject, &body).await;

        tracing::info!("Password reset requested for user {}", user.id);
        Ok(())
    }

    pub async fn reset_password(&self, email: &str, otp: &str, new_password: &str) -> AppResult<()> {
        self.credentials.consume_reset_otp(email, otp, new_password).await
    }

    pub async fn change_password(&self, email: &str, old_password: &str, new_password: &str) -> AppResult<()> {
        self.credentials.change_password(email, old_password, new_password).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repository.users.list().await
    }

    pub async fn get_by_email(&self, email: &str) -> AppResult<User> {
        self.repository
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with email {} not found", email)))
    }

    /// Delete a member account. Staff accounts and members holding books
    /// cannot be removed.
    pub async fn remove_member(&self, id: Uuid) -> AppResult<()> {
        let user = self
            .repository
            .users
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;

        if user.role != Role::Member {
            return Err(AppError::BusinessRule("Only members can be removed".to_string()));
        }

        let active = self.repository.loans.count_active_for_user(id).await?;
        if active > 0 {
            return Err(AppError::Conflict(format!(
                "Member still has {} borrowed book(s)",
                active
            )));
        }

        self.repository.users.delete(id).await?;
        tracing::info!("Removed member {} ({})", user.id, user.email);
        Ok(())
    }

    /// Create the configured administrator account if it does not exist yet
    pub async fn ensure_admin(&self, bootstrap: &BootstrapConfig) -> AppResult<()> {
        if self
            .repository
            .users
            .get_by_email(&bootstrap.admin_email)
            .await?
            .is_some()
        {
            tracing::debug!("Administrator {} already present", bootstrap.admin_email);
            return Ok(());
        }

        let admin = self
            .repository
            .users
            .create(NewUser {
                email: bootstrap.admin_email.clone(),
                password_hash: self.passwords.hash(&bootstrap.admin_password)?,
                first_name: Some("Admin".to_string()),
                last_name: None,
                role: Role::Admin,
                enabled: true,
                verification_code: None,
            })
            .await?;

        tracing::info!("Created administrator account {}", admin.email);
        Ok(())
    }

    async fn send_verification(&self, to: &str, code: &str) {
        let link = format!("{}?code={}", self.verification_base_url, code);
        let (subject, body) = verification_message(&link);
        deliver_best_effort(self.notifier.as_ref(), to, &subject, &body).await;
    }
}
