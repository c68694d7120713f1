//! User records and the login audit trail.
//!
//! Both collaborators are trait seams so the lifecycle tests can substitute
//! in-memory fakes; the Postgres implementations live here alongside them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

/// A user account, owned by the record store. The session core only reads it
/// and requests hash updates.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub registered_at: DateTime<Utc>,
    pub active: bool,
}

/// Append-only audit entry, one per successful authentication.
#[derive(Debug, Clone)]
pub struct LoginRecord {
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: String,
    pub platform: Option<String>,
    pub browser: Option<String>,
}

/// Outcome when attempting to create a new user record.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(User),
    Conflict,
}

#[async_trait]
pub trait UserRecords: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Insert a new record; a violated unique-email constraint surfaces as
    /// `InsertOutcome::Conflict`, not as an error.
    async fn insert(&self, email: &str, password_hash: &str) -> Result<InsertOutcome>;
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()>;
    async fn update_email(&self, id: Uuid, email: &str) -> Result<()>;
}

/// Fire-and-forget from the session manager's perspective: append failures
/// are logged, never fatal to token issuance.
#[async_trait]
pub trait LoginAudit: Send + Sync {
    async fn append(&self, record: LoginRecord) -> Result<()>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<LoginRecord>>;
}

pub struct PgUserRecords {
    pool: PgPool,
}

impl PgUserRecords {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password"),
        registered_at: row.get("registered_at"),
        active: row.get("active"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl UserRecords for PgUserRecords {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, password, registered_at, active FROM users WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;

        Ok(row.map(|row| row_to_user(&row)))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = "SELECT id, email, password, registered_at, active FROM users WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        Ok(row.map(|row| row_to_user(&row)))
    }

    async fn insert(&self, email: &str, password_hash: &str) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO users (email, password)
            VALUES ($1, $2)
            RETURNING id, email, password, registered_at, active
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(password_hash)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(InsertOutcome::Created(row_to_user(&row))),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let query = "UPDATE users SET password = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;

        Ok(())
    }

    async fn update_email(&self, id: Uuid, email: &str) -> Result<()> {
        let query = "UPDATE users SET email = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(email)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update email")?;

        Ok(())
    }
}

pub struct PgLoginAudit {
    pool: PgPool,
}

impl PgLoginAudit {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAudit for PgLoginAudit {
    async fn append(&self, record: LoginRecord) -> Result<()> {
        let query = r"
            INSERT INTO login_records (user_id, user_agent, platform, browser, ip, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.user_id)
            .bind(&record.user_agent)
            .bind(&record.platform)
            .bind(&record.browser)
            .bind(&record.ip)
            .bind(record.timestamp)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append login record")?;

        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<LoginRecord>> {
        let query = r"
            SELECT user_id, user_agent, platform, browser, ip, timestamp
            FROM login_records
            WHERE user_id = $1
            ORDER BY timestamp DESC
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list login records")?;

        Ok(rows
            .iter()
            .map(|row| LoginRecord {
                user_id: row.get("user_id"),
                user_agent: row.get("user_agent"),
                platform: row.get("platform"),
                browser: row.get("browser"),
                ip: row.get("ip"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}
