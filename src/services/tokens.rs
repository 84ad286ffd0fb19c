//! Signed session tokens
//!
//! Stateless: a token stays valid until its expiry, logout does not revoke it.

use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mockable::Clock;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{Capability, Role},
};

use super::SharedClock;

/// JWT claims of a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User email
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Identity carried by a verified session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub email: String,
    pub role: Role,
}

impl Session {
    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.role.can(capability) {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "Role {} is not allowed to perform this action",
                self.role
            )))
        }
    }

    /// Allow access to one's own data, or to anyone's with `capability`
    pub fn require_self_or(&self, email: &str, capability: Capability) -> AppResult<()> {
        if self.email.eq_ignore_ascii_case(email) {
            Ok(())
        } else {
            self.require(capability)
        }
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    clock: SharedClock,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            clock,
        }
    }

    /// Issue a token for `email` with `role`, expiring after the configured TTL
    pub fn issue_session(&self, email: &str, role: Role) -> AppResult<String> {
        let now = self.clock.utc();
        let claims = SessionClaims {
            sub: email.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Check signature and expiry and return the embedded identity
    pub fn verify(&self, token: &str) -> AppResult<Session> {
        // Expiry is compared against the injected clock below
        let mut validation = Validation::default();
        validation.validate_exp = false;

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))?
            .claims;

        if self.clock.utc().timestamp() >= claims.exp {
            return Err(AppError::Authentication("Token has expired".to_string()));
        }

        Ok(Session {
            email: claims.sub,
            role: claims.role,
        })
    }
}
