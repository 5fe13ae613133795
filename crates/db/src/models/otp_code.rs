use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// One-time sign-in code. Only the hash of the code is stored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OtpCode {
    pub id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub attempts: i64,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OtpCode {
    /// Store a new code, consuming any earlier outstanding codes for the same email.
    pub async fn create(
        pool: &SqlitePool,
        email: &str,
        code_hash: &str,
        ttl_minutes: i64,
    ) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query!(
            r#"UPDATE otp_codes
               SET consumed_at = datetime('now', 'subsec')
               WHERE email = $1 AND consumed_at IS NULL"#,
            email
        )
        .execute(&mut *tx)
        .await?;

        let id = Uuid::new_v4();
        let ttl = format!("{:+} minutes", ttl_minutes);
        let code = sqlx::query_as!(
            OtpCode,
            r#"INSERT INTO otp_codes (id, email, code_hash, expires_at)
               VALUES ($1, $2, $3, datetime('now', 'subsec', $4))
               RETURNING id as "id!: Uuid", email, code_hash, attempts as "attempts!: i64", expires_at as "expires_at!: DateTime<Utc>", consumed_at as "consumed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>""#,
            id,
            email,
            code_hash,
            ttl
        )
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(code)
    }

    /// Latest unconsumed code that has not expired.
    pub async fn find_active(pool: &SqlitePool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as!(
            OtpCode,
            r#"SELECT id as "id!: Uuid", email, code_hash, attempts as "attempts!: i64", expires_at as "expires_at!: DateTime<Utc>", consumed_at as "consumed_at: DateTime<Utc>", created_at as "created_at!: DateTime<Utc>"
               FROM otp_codes
               WHERE email = $1
                 AND consumed_at IS NULL
                 AND expires_at > datetime('now', 'subsec')
               ORDER BY created_at DESC
               LIMIT 1"#,
            email
        )
        .fetch_optional(pool)
        .await
    }

    /// Record a verification attempt while fewer than `max_attempts` have been made.
    /// Returns the new attempt count, or `None` once the code is used up or consumed.
    pub async fn record_attempt(
        pool: &SqlitePool,
        id: Uuid,
        max_attempts: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar!(
            r#"UPDATE otp_codes
               SET attempts = attempts + 1
               WHERE id = $1 AND consumed_at IS NULL AND attempts < $2
               RETURNING attempts as "attempts!: i64""#,
            id,
            max_attempts
        )
        .fetch_optional(pool)
        .await
    }

    /// Mark the code used. Returns false when it was already consumed.
    pub async fn consume(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query!(
            r#"UPDATE otp_codes
               SET consumed_at = datetime('now', 'subsec')
               WHERE id = $1 AND consumed_at IS NULL"#,
            id
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_expired(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query!(
            "DELETE FROM otp_codes WHERE expires_at <= datetime('now', 'subsec') OR consumed_at IS NOT NULL"
        )
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
