//! Session lifecycle: password verification, token pair issuance, per-device
//! refresh rotation, revocation, and blacklist-based invalidation.
//!
//! A (user, device) session moves `NoSession -> Active(jti) -> Active(jti')
//! -> Revoked`. Tokens are stateless signed artifacts; every transition is
//! recorded in the token store, and the store is the only shared mutable
//! state. All writes that change which jti is live are single atomic store
//! operations, so concurrent requests from the same user's devices cannot
//! leave two live refresh tokens for one device.

pub mod device;
pub mod error;
pub mod password;
pub mod store;
pub mod tokens;

use chrono::Utc;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{InsertOutcome, LoginAudit, LoginRecord, User, UserRecords};

use self::device::device_id;
use self::error::AuthError;
use self::password::{hash_password, verify_password};
use self::store::TokenStore;
use self::tokens::{Claims, TokenIssuer, TokenType};

const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;
// Tolerates clock skew between issuing and validating processes when sizing
// blacklist entries.
const TIME_SLACK_SECONDS: u64 = 10;

#[derive(Clone)]
pub struct SessionConfig {
    signing_key: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    time_slack: Duration,
}

impl SessionConfig {
    #[must_use]
    pub fn new(signing_key: SecretString) -> Self {
        Self {
            signing_key,
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
            time_slack: Duration::from_secs(TIME_SLACK_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }
}

/// A freshly issued access/refresh pair. The refresh token's jti is already
/// registered in the token store by the time a pair leaves the manager.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Entry point for every lifecycle operation. Stateless apart from the
/// signing key; safe to share across request handlers.
pub struct SessionManager {
    users: Arc<dyn UserRecords>,
    audit: Arc<dyn LoginAudit>,
    store: Arc<dyn TokenStore>,
    issuer: TokenIssuer,
    config: SessionConfig,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRecords>,
        audit: Arc<dyn LoginAudit>,
        store: Arc<dyn TokenStore>,
        config: SessionConfig,
    ) -> Self {
        let issuer = TokenIssuer::new(&config.signing_key, config.access_ttl, config.refresh_ttl);

        Self {
            users,
            audit,
            store,
            issuer,
            config,
        }
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.config.access_ttl
    }

    /// Create a user record with a freshly hashed password.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let password_hash = hash_password(password)?;

        match self
            .users
            .insert(email, &password_hash)
            .await
            .map_err(AuthError::Database)?
        {
            InsertOutcome::Created(user) => Ok(user),
            InsertOutcome::Conflict => Err(AuthError::AlreadyExists),
        }
    }

    /// Password authentication: on success, issue an access/refresh pair for
    /// the caller's device and append one login record.
    ///
    /// Unknown email, inactive account, and wrong password all collapse into
    /// `AuthenticationFailed`.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        user_agent: &str,
        ip: Option<&str>,
    ) -> Result<TokenPair, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(AuthError::Database)?
            .ok_or(AuthError::AuthenticationFailed)?;

        if !user.active || !verify_password(password, &user.password_hash) {
            return Err(AuthError::AuthenticationFailed);
        }

        let device = device_id(user_agent);
        debug!(user_id = %user.id, device = %device, "authenticated");

        // A second login from the same device fingerprint supersedes the
        // previous session for that device.
        let pair = self.issue_pair(user.id, &device).await?;

        // Best effort: a failed audit write must not block token issuance.
        let record = LoginRecord {
            user_id: user.id,
            timestamp: Utc::now(),
            ip: ip.map(ToString::to_string),
            user_agent: user_agent.to_string(),
            platform: device::platform(user_agent).map(ToString::to_string),
            browser: device::browser(user_agent).map(ToString::to_string),
        };
        if let Err(err) = self.audit.append(record).await {
            warn!("failed to append login record: {err:#}");
        }

        Ok(pair)
    }

    /// Exchange a refresh token for a fresh pair bound to the same device.
    ///
    /// Rotation is a compare-and-swap on the store: presenting the same
    /// refresh token a second time fails with `TokenRevoked` because its jti
    /// is no longer the live one. An explicitly blacklisted refresh token is
    /// rejected the same way, before anything is issued.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.decode(refresh_token)?;

        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidToken);
        }

        if self.store.is_blacklisted(claims.jti).await? {
            debug!(user_id = %claims.sub, device = %claims.device, "blacklisted refresh token presented");
            return Err(AuthError::TokenRevoked);
        }

        let access = self.issuer.issue_access_token(claims.sub, &claims.device)?;
        let refresh = self.issuer.issue_refresh_token(claims.sub, &claims.device)?;

        let rotated = self
            .store
            .rotate_refresh_token(
                claims.sub,
                &claims.device,
                claims.jti,
                refresh.claims.jti,
                self.config.refresh_ttl,
            )
            .await?;

        if !rotated {
            debug!(user_id = %claims.sub, device = %claims.device, "stale refresh token presented");
            return Err(AuthError::TokenRevoked);
        }

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Single-device logout: the device's refresh token stops being
    /// renewable. Outstanding access tokens ride out their natural TTL.
    pub async fn revoke_device(&self, user_id: Uuid, user_agent: &str) -> Result<(), AuthError> {
        let device = device_id(user_agent);
        self.store.remove_refresh_token(user_id, &device).await?;

        Ok(())
    }

    /// Logout from every device of a user.
    pub async fn revoke_all_devices(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.store.remove_all_refresh_tokens(user_id).await?;

        Ok(())
    }

    /// Kill one exact token: blacklist its jti for the remainder of its
    /// lifetime plus slack. Works on access and refresh tokens, including
    /// already-expired ones.
    pub async fn blacklist_token(&self, raw_token: &str) -> Result<(), AuthError> {
        let claims = self.issuer.decode_for_revocation(raw_token)?;

        let now = Utc::now().timestamp();
        let remaining = u64::try_from(claims.exp.saturating_sub(now)).unwrap_or(0);
        let ttl = Duration::from_secs(remaining) + self.config.time_slack;

        self.store.blacklist_token(claims.jti, ttl).await?;

        Ok(())
    }

    /// Validate a bearer access token for request admission.
    ///
    /// Signature and expiry come from the token itself; the blacklist check
    /// is what makes an explicit logout stick before natural expiry. A store
    /// failure here fails closed.
    pub async fn authorize_access(&self, raw_token: &str) -> Result<Claims, AuthError> {
        let claims = self.issuer.decode(raw_token)?;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::InvalidToken);
        }

        if self.store.is_blacklisted(claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Liveness check for a refresh-family jti, by jti alone.
    pub async fn refresh_token_live(&self, jti: Uuid) -> Result<bool, AuthError> {
        Ok(self.store.refresh_token_exists(jti).await?)
    }

    pub async fn user_info(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        self.users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Database)
    }

    pub async fn update_email(&self, user_id: Uuid, email: &str) -> Result<(), AuthError> {
        self.users
            .update_email(user_id, email)
            .await
            .map_err(AuthError::Database)
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let password_hash = hash_password(new_password)?;

        self.users
            .update_password_hash(user_id, &password_hash)
            .await
            .map_err(AuthError::Database)
    }

    pub async fn login_history(&self, user_id: Uuid) -> Result<Vec<LoginRecord>, AuthError> {
        self.audit
            .list_for_user(user_id)
            .await
            .map_err(AuthError::Database)
    }

    async fn issue_pair(&self, user_id: Uuid, device: &str) -> Result<TokenPair, AuthError> {
        let access = self.issuer.issue_access_token(user_id, device)?;
        let refresh = self.issuer.issue_refresh_token(user_id, device)?;

        // Register before returning: a refresh token never leaves the
        // process unregistered, and issuance is durable once the store
        // accepts the write.
        self.store
            .put_refresh_token(
                refresh.claims.jti,
                user_id,
                device,
                self.config.refresh_ttl,
            )
            .await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }
}
