//! Outgoing notifications (verification links and reset codes)

use std::str::FromStr;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// Delivery sink for user-facing messages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Deliver a message, logging instead of failing when the sink errors.
/// State changes made before the call are never rolled back.
pub async fn deliver_best_effort(notifier: &dyn Notifier, to: &str, subject: &str, body: &str) {
    if let Err(e) = notifier.deliver(to, subject, body).await {
        tracing::warn!("Failed to deliver '{}' to {}: {}", subject, to, e);
    }
}

pub fn verification_message(link: &str) -> (String, String) {
    (
        "Verify your Librario account".to_string(),
        format!(
            r#"
Welcome to Librario!

Please confirm your email address by opening the following link:

{link}

If you did not create an account, you can ignore this email.
"#,
            link = link
        ),
    )
}

pub fn reset_otp_message(otp: &str, minutes: i64) -> (String, String) {
    (
        "Your Librario password reset code".to_string(),
        format!(
            r#"
Your password reset code is: {otp}

This code will expire in {minutes} minutes.

If you didn't request a password reset, please ignore this email.
"#,
            otp = otp,
            minutes = minutes
        ),
    )
}

/// SMTP delivery through lettre
#[derive(Clone)]
pub struct SmtpNotifier {
    config: EmailConfig,
}

impl SmtpNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Librario");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn build_transport(&self) -> AppResult<SmtpTransport> {
        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => mailer_builder,
        };

        Ok(mailer_builder.build())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let email = self.build_message(to, subject, body)?;
        let mailer = self.build_transport()?;

        // lettre's SMTP transport is blocking
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        tracing::info!("Sent '{}' to {}", subject, to);
        Ok(())
    }
}

/// Writes messages to the log; used when SMTP is disabled
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(to = %to, subject = %subject, "Email delivery disabled, message body:\n{}", body);
        Ok(())
    }
}
