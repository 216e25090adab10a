//! Account approval repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{parse_variant, AccountApproval, AccountApprovalStatus};
use sqlx::{FromRow, PgPool};

use crate::repository::{RepositoryError, RepositoryResult};
use crate::store::AccountStore;

const ACCOUNT_COLUMNS: &str = r#"
    id, email, full_name, department_id, requested_role, status, reviewed_by,
    reviewed_at, rejection_reason, created_at
"#;

#[derive(Debug, Clone, FromRow)]
pub struct AccountApprovalRow {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub department_id: Option<i64>,
    pub requested_role: String,
    pub status: String,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AccountApprovalRow> for AccountApproval {
    type Error = RepositoryError;

    fn try_from(row: AccountApprovalRow) -> Result<Self, Self::Error> {
        Ok(AccountApproval {
            id: Some(row.id),
            email: row.email,
            full_name: row.full_name,
            department_id: row.department_id,
            requested_role: parse_variant("member role", &row.requested_role)?,
            status: parse_variant("account approval status", &row.status)?,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            rejection_reason: row.rejection_reason,
            created_at: Some(row.created_at),
        })
    }
}

pub struct AccountApprovalRepository {
    pool: PgPool,
}

impl AccountApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for AccountApprovalRepository {
    async fn create_request(&self, request: AccountApproval) -> RepositoryResult<AccountApproval> {
        let sql = format!(
            r#"
            INSERT INTO account_approvals (email, full_name, department_id, requested_role, status, created_at)
            VALUES ($1, $2, $3, $4, 'pending', NOW())
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AccountApprovalRow>(&sql)
            .bind(&request.email)
            .bind(&request.full_name)
            .bind(request.department_id)
            .bind(request.requested_role.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                RepositoryError::from_insert(e, "a sign-up request for this e-mail is already pending")
            })?;

        AccountApproval::try_from(row)
    }

    async fn find_request(&self, id: Id) -> RepositoryResult<Option<AccountApproval>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account_approvals WHERE id = $1");
        sqlx::query_as::<_, AccountApprovalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AccountApproval::try_from)
            .transpose()
    }

    async fn find_pending_by_email(&self, email: &str) -> RepositoryResult<Option<AccountApproval>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account_approvals WHERE lower(email) = lower($1) AND status = 'pending'"
        );
        sqlx::query_as::<_, AccountApprovalRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(AccountApproval::try_from)
            .transpose()
    }

    async fn list_requests(
        &self,
        status: Option<AccountApprovalStatus>,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<AccountApproval>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account_approvals \
             WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, AccountApprovalRow>(&sql)
            .bind(status.map(|s| s.to_string()))
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM account_approvals WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status.map(|s| s.to_string()))
        .fetch_one(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(AccountApproval::try_from)
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok(Page::new(items, total, page))
    }

    async fn decide(
        &self,
        id: Id,
        status: AccountApprovalStatus,
        reviewed_by: Option<Id>,
        reason: Option<String>,
    ) -> RepositoryResult<AccountApproval> {
        let sql = format!(
            r#"
            UPDATE account_approvals SET
                status = $1,
                reviewed_by = $2,
                reviewed_at = NOW(),
                rejection_reason = $3
            WHERE id = $4 AND status = 'pending'
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AccountApprovalRow>(&sql)
            .bind(status.to_string())
            .bind(reviewed_by)
            .bind(&reason)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => AccountApproval::try_from(row),
            None if self.find_request(id).await?.is_some() => Err(RepositoryError::Conflict(
                "sign-up request has already been decided".to_string(),
            )),
            None => Err(RepositoryError::not_found("AccountApproval", id)),
        }
    }
}
