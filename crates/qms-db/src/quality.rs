//! Audit and non-conformance repositories

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{parse_variant, Audit, NonConformance};
use sqlx::{FromRow, PgPool};

use crate::repository::{Repository, RepositoryError, RepositoryResult};
use crate::store::{AuditChanges, AuditFilter, AuditStore, NcChanges, NcFilter, NonConformanceStore};

const AUDIT_COLUMNS: &str = r#"
    id, title, department_id, auditor_id, scheduled_date, status, findings,
    created_at, updated_at
"#;

const NC_COLUMNS: &str = r#"
    id, title, description, audit_id, department_id, severity, status,
    corrective_action, assignee_id, due_date, closed_at, created_at, updated_at
"#;

#[derive(Debug, Clone, FromRow)]
pub struct AuditRow {
    pub id: i64,
    pub title: String,
    pub department_id: Option<i64>,
    pub auditor_id: Option<i64>,
    pub scheduled_date: NaiveDate,
    pub status: String,
    pub findings: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for Audit {
    type Error = RepositoryError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(Audit {
            id: Some(row.id),
            title: row.title,
            department_id: row.department_id,
            auditor_id: row.auditor_id,
            scheduled_date: row.scheduled_date,
            status: parse_variant("audit status", &row.status)?,
            findings: row.findings,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Audit, Audit, AuditChanges> for AuditRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Audit>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audits WHERE id = $1");
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Audit::try_from)
            .transpose()
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Audit>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audits ORDER BY scheduled_date DESC LIMIT $1 OFFSET $2");
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Audit::try_from)
            .collect()
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audits")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create(&self, audit: Audit) -> RepositoryResult<Audit> {
        let sql = format!(
            r#"
            INSERT INTO audits (title, department_id, auditor_id, scheduled_date, status, findings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {AUDIT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(&audit.title)
            .bind(audit.department_id)
            .bind(audit.auditor_id)
            .bind(audit.scheduled_date)
            .bind(audit.status.to_string())
            .bind(&audit.findings)
            .fetch_one(&self.pool)
            .await?;
        Audit::try_from(row)
    }

    async fn update(&self, id: Id, changes: AuditChanges) -> RepositoryResult<Audit> {
        let sql = format!(
            r#"
            UPDATE audits SET
                title = COALESCE($1, title),
                auditor_id = COALESCE($2, auditor_id),
                scheduled_date = COALESCE($3, scheduled_date),
                status = COALESCE($4, status),
                findings = COALESCE($5, findings),
                updated_at = NOW()
            WHERE id = $6
            RETURNING {AUDIT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(&changes.title)
            .bind(changes.auditor_id)
            .bind(changes.scheduled_date)
            .bind(changes.status.map(|s| s.to_string()))
            .bind(&changes.findings)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Audit", id))?;
        Audit::try_from(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM audits WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Audit", id));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for AuditRepository {
    async fn list(&self, filter: &AuditFilter, page: &PaginationParams) -> RepositoryResult<Page<Audit>> {
        let where_clause = "($1::text IS NULL OR status = $1) AND ($2::bigint IS NULL OR department_id = $2)";

        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audits WHERE {where_clause} \
             ORDER BY scheduled_date DESC LIMIT $3 OFFSET $4"
        );
        let items = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.department_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Audit::try_from)
            .collect::<RepositoryResult<Vec<_>>>()?;

        let total = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM audits WHERE {where_clause}"))
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.department_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(items, total, page))
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NonConformanceRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub audit_id: Option<i64>,
    pub department_id: Option<i64>,
    pub severity: String,
    pub status: String,
    pub corrective_action: Option<String>,
    pub assignee_id: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<NonConformanceRow> for NonConformance {
    type Error = RepositoryError;

    fn try_from(row: NonConformanceRow) -> Result<Self, Self::Error> {
        Ok(NonConformance {
            id: Some(row.id),
            title: row.title,
            description: row.description,
            audit_id: row.audit_id,
            department_id: row.department_id,
            severity: parse_variant("severity", &row.severity)?,
            status: parse_variant("non-conformance status", &row.status)?,
            corrective_action: row.corrective_action,
            assignee_id: row.assignee_id,
            due_date: row.due_date,
            closed_at: row.closed_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

pub struct NonConformanceRepository {
    pool: PgPool,
}

impl NonConformanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<NonConformance, NonConformance, NcChanges> for NonConformanceRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<NonConformance>> {
        let sql = format!("SELECT {NC_COLUMNS} FROM non_conformances WHERE id = $1");
        sqlx::query_as::<_, NonConformanceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(NonConformance::try_from)
            .transpose()
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<NonConformance>> {
        let sql = format!("SELECT {NC_COLUMNS} FROM non_conformances ORDER BY id DESC LIMIT $1 OFFSET $2");
        sqlx::query_as::<_, NonConformanceRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(NonConformance::try_from)
            .collect()
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM non_conformances")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create(&self, nc: NonConformance) -> RepositoryResult<NonConformance> {
        let sql = format!(
            r#"
            INSERT INTO non_conformances (
                title, description, audit_id, department_id, severity, status,
                corrective_action, assignee_id, due_date, closed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
            RETURNING {NC_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, NonConformanceRow>(&sql)
            .bind(&nc.title)
            .bind(&nc.description)
            .bind(nc.audit_id)
            .bind(nc.department_id)
            .bind(nc.severity.to_string())
            .bind(nc.status.to_string())
            .bind(&nc.corrective_action)
            .bind(nc.assignee_id)
            .bind(nc.due_date)
            .bind(nc.closed_at)
            .fetch_one(&self.pool)
            .await?;
        NonConformance::try_from(row)
    }

    async fn update(&self, id: Id, changes: NcChanges) -> RepositoryResult<NonConformance> {
        let sql = format!(
            r#"
            UPDATE non_conformances SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                severity = COALESCE($3, severity),
                status = COALESCE($4, status),
                corrective_action = COALESCE($5, corrective_action),
                assignee_id = COALESCE($6, assignee_id),
                due_date = COALESCE($7, due_date),
                closed_at = COALESCE($8, closed_at),
                updated_at = NOW()
            WHERE id = $9
            RETURNING {NC_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, NonConformanceRow>(&sql)
            .bind(&changes.title)
            .bind(&changes.description)
            .bind(changes.severity.map(|s| s.to_string()))
            .bind(changes.status.map(|s| s.to_string()))
            .bind(&changes.corrective_action)
            .bind(changes.assignee_id)
            .bind(changes.due_date)
            .bind(changes.closed_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("NonConformance", id))?;
        NonConformance::try_from(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM non_conformances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("NonConformance", id));
        }
        Ok(())
    }
}

#[async_trait]
impl NonConformanceStore for NonConformanceRepository {
    async fn list(
        &self,
        filter: &NcFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<NonConformance>> {
        let where_clause = r#"
            ($1::text IS NULL OR status = $1)
            AND ($2::text IS NULL OR severity = $2)
            AND ($3::bigint IS NULL OR department_id = $3)
        "#;

        let sql = format!(
            "SELECT {NC_COLUMNS} FROM non_conformances WHERE {where_clause} \
             ORDER BY id DESC LIMIT $4 OFFSET $5"
        );
        let items = sqlx::query_as::<_, NonConformanceRow>(&sql)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.severity.map(|s| s.to_string()))
            .bind(filter.department_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(NonConformance::try_from)
            .collect::<RepositoryResult<Vec<_>>>()?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM non_conformances WHERE {where_clause}"
        ))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.severity.map(|s| s.to_string()))
        .bind(filter.department_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page::new(items, total, page))
    }
}
