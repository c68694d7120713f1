//! Signed access/refresh token issuance and verification.
//!
//! Tokens are stateless HS256 JWTs. An access token proves itself by
//! signature, expiry, and absence from the blacklist; a refresh token
//! additionally requires its jti to still be the registered one for its
//! (user, device) pair in the token store.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use super::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    /// Device fingerprint the token is bound to.
    pub device: String,
    /// Revocation/liveness key.
    pub jti: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed token plus the claims that went into it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Mints and verifies token pairs. Holds only the signing key material and
/// the configured lifetimes; all revocation state lives in the token store.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid, device: &str) -> Result<IssuedToken, AuthError> {
        self.issue(user_id, device, TokenType::Access, self.access_ttl)
    }

    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        device: &str,
    ) -> Result<IssuedToken, AuthError> {
        self.issue(user_id, device, TokenType::Refresh, self.refresh_ttl)
    }

    fn issue(
        &self,
        user_id: Uuid,
        device: &str,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            device: device.to_string(),
            jti: Uuid::new_v4(),
            token_type,
            iat: now,
            exp: now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|_| AuthError::InvalidToken)?;

        Ok(IssuedToken { token, claims })
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Does not consult the token store; liveness and blacklist checks are
    /// the session manager's job.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Signature-checked decode that ignores expiry.
    ///
    /// Explicit blacklisting must work on tokens that already expired; the
    /// claims are only used to compute the blacklist TTL, never to authorize.
    pub fn decode_for_revocation(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }
}
