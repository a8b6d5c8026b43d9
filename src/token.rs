//! Session token issuance and validation.

use crate::models::{Claims, Role};
use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};

/// How long an issued token stays valid.
pub const TOKEN_LIFETIME: Duration = Duration::hours(72);

/// Outcome of checking a token.
///
/// A bad signature, a malformed token and an expired token all look the same
/// here: `valid` is false and there are no claims.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub valid: bool,
    pub claims: Option<Claims>,
}

impl TokenValidation {
    fn invalid() -> Self {
        Self {
            valid: false,
            claims: None,
        }
    }
}

/// Signs and verifies HS256 session tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Issue a token for `username` that expires [`TOKEN_LIFETIME`] from now.
    pub fn issue(&self, username: &str, role: Role) -> Result<String> {
        self.issue_at(username, role, OffsetDateTime::now_utc())
    }

    /// Issue a token as if it were created at `issued_at`.
    pub fn issue_at(&self, username: &str, role: Role, issued_at: OffsetDateTime) -> Result<String> {
        let claims = Claims {
            sub: username.to_string(),
            role,
            iat: issued_at.unix_timestamp(),
            exp: (issued_at + TOKEN_LIFETIME).unix_timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("Failed to sign token")
    }

    pub fn validate(&self, token: &str) -> TokenValidation {
        match jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => TokenValidation {
                valid: true,
                claims: Some(data.claims),
            },
            Err(e) => {
                tracing::debug!("Rejected token: {}", e);
                TokenValidation::invalid()
            }
        }
    }
}
