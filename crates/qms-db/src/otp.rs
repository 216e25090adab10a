//! One-time code repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qms_core::traits::Id;
use qms_models::OtpCode;
use sqlx::{FromRow, PgPool};

use crate::repository::{RepositoryError, RepositoryResult};
use crate::store::OtpStore;

#[derive(Debug, Clone, FromRow)]
pub struct OtpCodeRow {
    pub id: i64,
    pub email: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
    pub failed_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl From<OtpCodeRow> for OtpCode {
    fn from(row: OtpCodeRow) -> Self {
        OtpCode {
            id: Some(row.id),
            email: row.email,
            code: row.code,
            expires_at: row.expires_at,
            verified: row.verified,
            failed_attempts: row.failed_attempts,
            created_at: Some(row.created_at),
        }
    }
}

pub struct OtpCodeRepository {
    pool: PgPool,
}

impl OtpCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for OtpCodeRepository {
    async fn insert_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<OtpCode> {
        let row = sqlx::query_as::<_, OtpCodeRow>(
            r#"
            INSERT INTO otp_codes (email, code, expires_at, verified, created_at)
            VALUES ($1, $2, $3, FALSE, NOW())
            RETURNING id, email, code, expires_at, verified, failed_attempts, created_at
            "#,
        )
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn latest_usable(&self, email: &str, now: DateTime<Utc>) -> RepositoryResult<Option<OtpCode>> {
        let row = sqlx::query_as::<_, OtpCodeRow>(
            r#"
            SELECT id, email, code, expires_at, verified, failed_attempts, created_at
            FROM otp_codes
            WHERE lower(email) = lower($1) AND NOT verified AND expires_at > $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(OtpCode::from))
    }

    async fn mark_verified(&self, id: Id) -> RepositoryResult<bool> {
        let result = sqlx::query("UPDATE otp_codes SET verified = TRUE WHERE id = $1 AND NOT verified")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_attempt(&self, id: Id, max_attempts: i32) -> RepositoryResult<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE otp_codes
            SET failed_attempts = failed_attempts + 1,
                verified = verified OR failed_attempts + 1 >= $2
            WHERE id = $1
            RETURNING failed_attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;

        attempts.ok_or_else(|| RepositoryError::not_found("OtpCode", id))
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
