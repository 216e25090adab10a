//! Aggregate queries for the dashboard report and database-utils

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;

use crate::repository::RepositoryResult;
use crate::store::ReportStore;

/// Tables reported by `table_counts`
pub const QMS_TABLES: &[&str] = &[
    "tasks",
    "documents",
    "document_revisions",
    "approval_hierarchy",
    "account_approvals",
    "otp_codes",
    "team_members",
    "departments",
    "audits",
    "non_conformances",
];

/// Label for tasks without a department
pub const UNASSIGNED_DEPARTMENT: &str = "Unassigned";

#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentTaskCount {
    pub department: String,
    pub total: i64,
    pub open: i64,
    pub overdue: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Work items (templates excluded) keyed by status
    pub tasks_by_status: BTreeMap<String, i64>,
    pub overdue: i64,
    pub completed_last_day: i64,
    pub pending_document_approvals: i64,
    pub open_non_conformances: i64,
    pub departments: Vec<DepartmentTaskCount>,
}

impl DashboardStats {
    pub fn total_tasks(&self) -> i64 {
        self.tasks_by_status.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

pub struct ReportRepository {
    pool: PgPool,
}

impl ReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportStore for ReportRepository {
    async fn dashboard_stats(&self, today: NaiveDate) -> RepositoryResult<DashboardStats> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM tasks
            WHERE NOT (is_recurring AND parent_task_id IS NULL)
            GROUP BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let completed_last_day = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tasks WHERE status = 'completed' AND completed_at >= ($1::date - 1)",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        let pending_document_approvals = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM documents WHERE status IN ('pending-checker', 'pending-approval')",
        )
        .fetch_one(&self.pool)
        .await?;

        let open_non_conformances = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM non_conformances WHERE status <> 'closed'",
        )
        .fetch_one(&self.pool)
        .await?;

        let departments = sqlx::query_as::<_, DepartmentTaskCount>(
            r#"
            SELECT COALESCE(d.name, $1) AS department,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE t.status IN ('not-started', 'in-progress')) AS open,
                   COUNT(*) FILTER (WHERE t.status = 'overdue') AS overdue
            FROM tasks t
            LEFT JOIN departments d ON d.id = t.department_id
            WHERE NOT (t.is_recurring AND t.parent_task_id IS NULL)
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(UNASSIGNED_DEPARTMENT)
        .fetch_all(&self.pool)
        .await?;

        let tasks_by_status: BTreeMap<String, i64> = by_status.into_iter().collect();
        Ok(DashboardStats {
            overdue: tasks_by_status.get("overdue").copied().unwrap_or(0),
            tasks_by_status,
            completed_last_day,
            pending_document_approvals,
            open_non_conformances,
            departments,
        })
    }

    async fn table_counts(&self) -> RepositoryResult<Vec<TableCount>> {
        let mut counts = Vec::with_capacity(QMS_TABLES.len());
        for table in QMS_TABLES {
            let rows = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;
            counts.push(TableCount {
                table: table.to_string(),
                rows,
            });
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tasks() {
        let mut stats = DashboardStats::default();
        stats.tasks_by_status.insert("completed".into(), 4);
        stats.tasks_by_status.insert("overdue".into(), 2);
        assert_eq!(stats.total_tasks(), 6);
    }
}
