//! Document repository
//!
//! Documents, their revisions and the approval hierarchy attached to each
//! revision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{parse_variant, ApprovalHierarchy, Document, DocumentRevision, HierarchyStatus};
use sqlx::{FromRow, PgConnection, PgPool};

use crate::repository::{RepositoryError, RepositoryResult};
use crate::store::{DocumentDetail, DocumentFilter, DocumentStore, NewRevision, Participants};

const DOCUMENT_COLUMNS: &str = r#"
    id, title, document_number, department_id, owner_id, current_revision_id,
    status, created_at, updated_at
"#;

const REVISION_COLUMNS: &str = r#"
    id, document_id, revision_number, file_path, file_name, change_summary,
    uploaded_by, created_at
"#;

const HIERARCHY_COLUMNS: &str = r#"
    id, document_id, revision_id, initiator_id, checker_id, approver_id,
    initiator_approved, initiator_approved_at, checker_approved, checker_approved_at,
    approver_approved, approver_approved_at, status, rejection_reason, rejected_by,
    created_at, updated_at
"#;

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub title: String,
    pub document_number: String,
    pub department_id: Option<i64>,
    pub owner_id: i64,
    pub current_revision_id: Option<i64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: Some(row.id),
            title: row.title,
            document_number: row.document_number,
            department_id: row.department_id,
            owner_id: row.owner_id,
            current_revision_id: row.current_revision_id,
            status: parse_variant("hierarchy status", &row.status)?,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RevisionRow {
    pub id: i64,
    pub document_id: i64,
    pub revision_number: i32,
    pub file_path: String,
    pub file_name: String,
    pub change_summary: Option<String>,
    pub uploaded_by: i64,
    pub created_at: DateTime<Utc>,
}

impl From<RevisionRow> for DocumentRevision {
    fn from(row: RevisionRow) -> Self {
        DocumentRevision {
            id: Some(row.id),
            document_id: row.document_id,
            revision_number: row.revision_number,
            file_path: row.file_path,
            file_name: row.file_name,
            change_summary: row.change_summary,
            uploaded_by: row.uploaded_by,
            created_at: Some(row.created_at),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HierarchyRow {
    pub id: i64,
    pub document_id: i64,
    pub revision_id: i64,
    pub initiator_id: i64,
    pub checker_id: i64,
    pub approver_id: i64,
    pub initiator_approved: bool,
    pub initiator_approved_at: Option<DateTime<Utc>>,
    pub checker_approved: bool,
    pub checker_approved_at: Option<DateTime<Utc>>,
    pub approver_approved: bool,
    pub approver_approved_at: Option<DateTime<Utc>>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<HierarchyRow> for ApprovalHierarchy {
    type Error = RepositoryError;

    fn try_from(row: HierarchyRow) -> Result<Self, Self::Error> {
        Ok(ApprovalHierarchy {
            id: Some(row.id),
            document_id: row.document_id,
            revision_id: row.revision_id,
            initiator_id: row.initiator_id,
            checker_id: row.checker_id,
            approver_id: row.approver_id,
            initiator_approved: row.initiator_approved,
            initiator_approved_at: row.initiator_approved_at,
            checker_approved: row.checker_approved,
            checker_approved_at: row.checker_approved_at,
            approver_approved: row.approver_approved,
            approver_approved_at: row.approver_approved_at,
            status: parse_variant("hierarchy status", &row.status)?,
            rejection_reason: row.rejection_reason,
            rejected_by: row.rejected_by,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

/// Insert a revision plus its draft hierarchy and point the document at it
async fn attach_revision(
    conn: &mut PgConnection,
    document_id: Id,
    revision_number: i32,
    revision: &NewRevision,
    participants: Participants,
) -> RepositoryResult<DocumentDetail> {
    let sql = format!(
        r#"
        INSERT INTO document_revisions (
            document_id, revision_number, file_path, file_name, change_summary, uploaded_by, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, NOW())
        RETURNING {REVISION_COLUMNS}
        "#
    );
    let revision_row = sqlx::query_as::<_, RevisionRow>(&sql)
        .bind(document_id)
        .bind(revision_number)
        .bind(&revision.file_path)
        .bind(&revision.file_name)
        .bind(&revision.change_summary)
        .bind(revision.uploaded_by)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "revision number already exists"))?;
    let revision = DocumentRevision::from(revision_row);

    let sql = format!(
        r#"
        INSERT INTO approval_hierarchy (
            document_id, revision_id, initiator_id, checker_id, approver_id,
            status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, 'draft', NOW(), NOW())
        RETURNING {HIERARCHY_COLUMNS}
        "#
    );
    let hierarchy = ApprovalHierarchy::try_from(
        sqlx::query_as::<_, HierarchyRow>(&sql)
            .bind(document_id)
            .bind(revision.id)
            .bind(participants.initiator_id)
            .bind(participants.checker_id)
            .bind(participants.approver_id)
            .fetch_one(&mut *conn)
            .await?,
    )?;

    let sql = format!(
        r#"
        UPDATE documents SET current_revision_id = $1, status = 'draft', updated_at = NOW()
        WHERE id = $2
        RETURNING {DOCUMENT_COLUMNS}
        "#
    );
    let document = Document::try_from(
        sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(revision.id)
            .bind(document_id)
            .fetch_one(&mut *conn)
            .await?,
    )?;

    Ok(DocumentDetail {
        document,
        revision,
        hierarchy,
    })
}

/// Document repository implementation
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for DocumentRepository {
    async fn create_document(
        &self,
        document: Document,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO documents (title, document_number, department_id, owner_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'draft', NOW(), NOW())
            RETURNING {DOCUMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&document.title)
            .bind(&document.document_number)
            .bind(document.department_id)
            .bind(document.owner_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_insert(e, "document number already in use"))?;

        let detail = attach_revision(&mut *tx, row.id, 1, &revision, participants).await?;
        tx.commit().await?;

        tracing::info!(document_id = row.id, "Created document");
        Ok(detail)
    }

    async fn find_document(&self, id: Id) -> RepositoryResult<Option<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1");
        sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Document::try_from)
            .transpose()
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<Document>> {
        let where_clause = r#"
            ($1::text IS NULL OR status = $1)
            AND ($2::bigint IS NULL OR department_id = $2)
            AND ($3::bigint IS NULL OR owner_id = $3)
        "#;

        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE {where_clause} \
             ORDER BY updated_at DESC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.department_id)
            .bind(filter.owner_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM documents WHERE {where_clause}"
        ))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.department_id)
        .bind(filter.owner_id)
        .fetch_one(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Document::try_from)
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok(Page::new(items, total, page))
    }

    async fn revisions(&self, document_id: Id) -> RepositoryResult<Vec<DocumentRevision>> {
        let sql = format!(
            "SELECT {REVISION_COLUMNS} FROM document_revisions WHERE document_id = $1 ORDER BY revision_number"
        );
        let rows = sqlx::query_as::<_, RevisionRow>(&sql)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DocumentRevision::from).collect())
    }

    async fn current_hierarchy(&self, document_id: Id) -> RepositoryResult<Option<ApprovalHierarchy>> {
        let sql = format!(
            r#"
            SELECT {HIERARCHY_COLUMNS} FROM approval_hierarchy
            WHERE revision_id = (SELECT current_revision_id FROM documents WHERE id = $1)
            "#
        );
        sqlx::query_as::<_, HierarchyRow>(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ApprovalHierarchy::try_from)
            .transpose()
    }

    async fn save_transition(
        &self,
        hierarchy: &ApprovalHierarchy,
        from: HierarchyStatus,
    ) -> RepositoryResult<ApprovalHierarchy> {
        let id = hierarchy
            .id
            .ok_or_else(|| RepositoryError::Validation("hierarchy has not been saved".to_string()))?;
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE approval_hierarchy SET
                initiator_approved = $1,
                initiator_approved_at = $2,
                checker_approved = $3,
                checker_approved_at = $4,
                approver_approved = $5,
                approver_approved_at = $6,
                status = $7,
                rejection_reason = $8,
                rejected_by = $9,
                updated_at = NOW()
            WHERE id = $10 AND status = $11
            RETURNING {HIERARCHY_COLUMNS}
            "#
        );
        let saved = sqlx::query_as::<_, HierarchyRow>(&sql)
            .bind(hierarchy.initiator_approved)
            .bind(hierarchy.initiator_approved_at)
            .bind(hierarchy.checker_approved)
            .bind(hierarchy.checker_approved_at)
            .bind(hierarchy.approver_approved)
            .bind(hierarchy.approver_approved_at)
            .bind(hierarchy.status.to_string())
            .bind(&hierarchy.rejection_reason)
            .bind(hierarchy.rejected_by)
            .bind(id)
            .bind(from.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                RepositoryError::Conflict(format!("approval is no longer {}", from))
            })?;
        let saved = ApprovalHierarchy::try_from(saved)?;

        sqlx::query(
            "UPDATE documents SET status = $1, updated_at = NOW() WHERE id = $2 AND current_revision_id = $3",
        )
        .bind(saved.status.to_string())
        .bind(saved.document_id)
        .bind(saved.revision_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(saved)
    }

    async fn add_revision(
        &self,
        document_id: Id,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE id = $1 FOR UPDATE")
            .bind(document_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(RepositoryError::not_found("Document", document_id));
        }

        let latest: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(revision_number) FROM document_revisions WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;

        let number = latest.unwrap_or(0) + 1;
        let detail = attach_revision(&mut *tx, document_id, number, &revision, participants).await?;
        tx.commit().await?;

        tracing::info!(document_id, revision = number, "Added document revision");
        Ok(detail)
    }
}
