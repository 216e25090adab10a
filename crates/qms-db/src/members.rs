//! Team member and department repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{parse_variant, Department, MemberRole, TeamMember};
use sqlx::{FromRow, PgPool};

use crate::repository::{Repository, RepositoryError, RepositoryResult};
use crate::store::{
    DepartmentChanges, DepartmentStore, MemberChanges, MemberFilter, MemberStore, Upserted,
};

const MEMBER_COLUMNS: &str = r#"
    id, full_name, email, role, department_id, status, hrone_employee_code,
    created_at, updated_at
"#;

#[derive(Debug, Clone, FromRow)]
pub struct TeamMemberRow {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub department_id: Option<i64>,
    pub status: String,
    pub hrone_employee_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TeamMemberRow> for TeamMember {
    type Error = RepositoryError;

    fn try_from(row: TeamMemberRow) -> Result<Self, Self::Error> {
        Ok(TeamMember {
            id: Some(row.id),
            full_name: row.full_name,
            email: row.email,
            role: parse_variant("member role", &row.role)?,
            department_id: row.department_id,
            status: parse_variant("member status", &row.status)?,
            hrone_employee_code: row.hrone_employee_code,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

fn into_members(rows: Vec<TeamMemberRow>) -> RepositoryResult<Vec<TeamMember>> {
    rows.into_iter().map(TeamMember::try_from).collect()
}

/// Team member repository implementation
pub struct TeamMemberRepository {
    pool: PgPool,
}

impl TeamMemberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<TeamMember, TeamMember, MemberChanges> for TeamMemberRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<TeamMember>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM team_members WHERE id = $1");
        sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(TeamMember::try_from)
            .transpose()
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<TeamMember>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM team_members ORDER BY full_name LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        into_members(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM team_members")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create(&self, member: TeamMember) -> RepositoryResult<TeamMember> {
        let sql = format!(
            r#"
            INSERT INTO team_members (
                full_name, email, role, department_id, status, hrone_employee_code, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            RETURNING {MEMBER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(&member.full_name)
            .bind(&member.email)
            .bind(member.role.to_string())
            .bind(member.department_id)
            .bind(member.status.to_string())
            .bind(&member.hrone_employee_code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_insert(e, "a team member with this e-mail already exists"))?;

        TeamMember::try_from(row)
    }

    async fn update(&self, id: Id, changes: MemberChanges) -> RepositoryResult<TeamMember> {
        let sql = format!(
            r#"
            UPDATE team_members SET
                full_name = COALESCE($1, full_name),
                role = COALESCE($2, role),
                department_id = COALESCE($3, department_id),
                status = COALESCE($4, status),
                hrone_employee_code = COALESCE($5, hrone_employee_code),
                updated_at = NOW()
            WHERE id = $6
            RETURNING {MEMBER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(&changes.full_name)
            .bind(changes.role.map(|r| r.to_string()))
            .bind(changes.department_id)
            .bind(changes.status.map(|s| s.to_string()))
            .bind(&changes.hrone_employee_code)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("TeamMember", id))?;

        TeamMember::try_from(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM team_members WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("TeamMember", id));
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for TeamMemberRepository {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<TeamMember>> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM team_members WHERE lower(email) = lower($1)");
        sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
            .map(TeamMember::try_from)
            .transpose()
    }

    async fn list(
        &self,
        filter: &MemberFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<TeamMember>> {
        let where_clause = r#"
            ($1::text IS NULL OR role = $1)
            AND ($2::text IS NULL OR status = $2)
            AND ($3::bigint IS NULL OR department_id = $3)
        "#;

        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members WHERE {where_clause} \
             ORDER BY full_name LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(filter.role.map(|r| r.to_string()))
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.department_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM team_members WHERE {where_clause}"
        ))
        .bind(filter.role.map(|r| r.to_string()))
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.department_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page::new(into_members(rows)?, total, page))
    }

    async fn active_with_roles(&self, roles: &[MemberRole]) -> RepositoryResult<Vec<TeamMember>> {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let sql = format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members \
             WHERE status = 'active' AND role = ANY($1) ORDER BY full_name"
        );
        let rows = sqlx::query_as::<_, TeamMemberRow>(&sql)
            .bind(&roles)
            .fetch_all(&self.pool)
            .await?;
        into_members(rows)
    }

    async fn upsert_by_email(&self, member: TeamMember) -> RepositoryResult<Upserted<TeamMember>> {
        // xmax = 0 only for rows inserted by this statement
        let sql = format!(
            r#"
            INSERT INTO team_members (
                full_name, email, role, department_id, status, hrone_employee_code, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (email) DO UPDATE SET
                full_name = EXCLUDED.full_name,
                department_id = COALESCE(EXCLUDED.department_id, team_members.department_id),
                status = CASE
                    WHEN EXCLUDED.status = 'inactive' THEN 'inactive'
                    ELSE team_members.status
                END,
                hrone_employee_code = COALESCE(EXCLUDED.hrone_employee_code, team_members.hrone_employee_code),
                updated_at = NOW()
            RETURNING {MEMBER_COLUMNS}, (xmax = 0) AS inserted
            "#
        );

        #[derive(FromRow)]
        struct UpsertRow {
            #[sqlx(flatten)]
            member: TeamMemberRow,
            inserted: bool,
        }

        let row = sqlx::query_as::<_, UpsertRow>(&sql)
            .bind(&member.full_name)
            .bind(&member.email)
            .bind(member.role.to_string())
            .bind(member.department_id)
            .bind(member.status.to_string())
            .bind(&member.hrone_employee_code)
            .fetch_one(&self.pool)
            .await?;

        Ok(Upserted {
            value: TeamMember::try_from(row.member)?,
            created: row.inserted,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DepartmentRow {
    pub id: i64,
    pub name: String,
    pub code: Option<String>,
    pub hrone_department_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Department {
            id: Some(row.id),
            name: row.name,
            code: row.code,
            hrone_department_id: row.hrone_department_id,
            created_at: Some(row.created_at),
        }
    }
}

/// Department repository implementation
pub struct DepartmentRepository {
    pool: PgPool,
}

impl DepartmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Department, Department, DepartmentChanges> for DepartmentRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Department>> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, code, hrone_department_id, created_at FROM departments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Department::from))
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Department>> {
        let rows = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, code, hrone_department_id, created_at FROM departments ORDER BY name LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Department::from).collect())
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM departments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create(&self, department: Department) -> RepositoryResult<Department> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            r#"
            INSERT INTO departments (name, code, hrone_department_id, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, name, code, hrone_department_id, created_at
            "#,
        )
        .bind(&department.name)
        .bind(&department.code)
        .bind(&department.hrone_department_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "department name already in use"))?;
        Ok(row.into())
    }

    async fn update(&self, id: Id, changes: DepartmentChanges) -> RepositoryResult<Department> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            r#"
            UPDATE departments SET
                name = COALESCE($1, name),
                code = COALESCE($2, code)
            WHERE id = $3
            RETURNING id, name, code, hrone_department_id, created_at
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.code)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "department name already in use"))?
        .ok_or_else(|| RepositoryError::not_found("Department", id))?;
        Ok(row.into())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Department", id));
        }
        Ok(())
    }
}

#[async_trait]
impl DepartmentStore for DepartmentRepository {
    async fn list_all(&self) -> RepositoryResult<Vec<Department>> {
        let rows = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, code, hrone_department_id, created_at FROM departments ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Department::from).collect())
    }

    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Department>> {
        let row = sqlx::query_as::<_, DepartmentRow>(
            "SELECT id, name, code, hrone_department_id, created_at FROM departments WHERE lower(name) = lower($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Department::from))
    }

    async fn upsert_by_hrone_id(&self, department: Department) -> RepositoryResult<Upserted<Department>> {
        let Some(hrone_id) = department.hrone_department_id.as_deref() else {
            return Err(RepositoryError::Validation(
                "HROne department id is required".to_string(),
            ));
        };

        #[derive(FromRow)]
        struct UpsertRow {
            #[sqlx(flatten)]
            department: DepartmentRow,
            inserted: bool,
        }

        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO departments (name, code, hrone_department_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (hrone_department_id) DO UPDATE SET
                name = EXCLUDED.name,
                code = COALESCE(EXCLUDED.code, departments.code)
            RETURNING id, name, code, hrone_department_id, created_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(&department.name)
        .bind(&department.code)
        .bind(hrone_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "department name already in use"))?;

        Ok(Upserted {
            value: row.department.into(),
            created: row.inserted,
        })
    }
}
