//! Task repository
//!
//! Database operations for tasks, including the transactional
//! complete-and-generate-next procedure for recurring series.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{parse_variant, plan_next_instance, first_instance, NextOccurrence, SkipReason, Task, TaskStatus};
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};

use crate::repository::{Repository, RepositoryError, RepositoryResult};
use crate::store::{Completion, Generated, TaskChanges, TaskDecision, TaskFilter, TaskStore};

const TASK_COLUMNS: &str = r#"
    id, title, description, department_id, assignee_id, created_by, priority,
    due_date, status, is_recurring, frequency, start_date, end_date,
    parent_task_id, recurrence_count_in_period, approver_id, approval_status,
    approval_reason, completed_at, created_at, updated_at
"#;

const TASK_FILTER: &str = r#"
    ($1::text IS NULL OR status = $1)
    AND ($2::bigint IS NULL OR department_id = $2)
    AND ($3::bigint IS NULL OR assignee_id = $3)
    AND ($4::bigint IS NULL OR parent_task_id = $4)
    AND (NOT $5 OR status = 'overdue')
    AND ($6 OR NOT (is_recurring AND parent_task_id IS NULL))
"#;

/// Task database row
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub department_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub created_by: Option<i64>,
    pub priority: String,
    pub due_date: Option<NaiveDate>,
    pub status: String,
    pub is_recurring: bool,
    pub frequency: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub parent_task_id: Option<i64>,
    pub recurrence_count_in_period: i32,
    pub approver_id: Option<i64>,
    pub approval_status: Option<String>,
    pub approval_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = RepositoryError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: Some(row.id),
            title: row.title,
            description: row.description,
            department_id: row.department_id,
            assignee_id: row.assignee_id,
            created_by: row.created_by,
            priority: parse_variant("task priority", &row.priority)?,
            due_date: row.due_date,
            status: parse_variant("task status", &row.status)?,
            is_recurring: row.is_recurring,
            frequency: row
                .frequency
                .as_deref()
                .map(|f| parse_variant("frequency", f))
                .transpose()?,
            start_date: row.start_date,
            end_date: row.end_date,
            parent_task_id: row.parent_task_id,
            recurrence_count_in_period: row.recurrence_count_in_period,
            approver_id: row.approver_id,
            approval_status: row
                .approval_status
                .as_deref()
                .map(|s| parse_variant("approval status", s))
                .transpose()?,
            approval_reason: row.approval_reason,
            completed_at: row.completed_at,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> RepositoryResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

async fn insert_task<'e, E: PgExecutor<'e>>(executor: E, task: &Task) -> RepositoryResult<Task> {
    let sql = format!(
        r#"
        INSERT INTO tasks (
            title, description, department_id, assignee_id, created_by, priority,
            due_date, status, is_recurring, frequency, start_date, end_date,
            parent_task_id, recurrence_count_in_period, approver_id, approval_status,
            approval_reason, completed_at, created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, NOW(), NOW()
        )
        RETURNING {TASK_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.department_id)
        .bind(task.assignee_id)
        .bind(task.created_by)
        .bind(task.priority.to_string())
        .bind(task.due_date)
        .bind(task.status.to_string())
        .bind(task.is_recurring)
        .bind(task.frequency.map(|f| f.to_string()))
        .bind(task.start_date)
        .bind(task.end_date)
        .bind(task.parent_task_id)
        .bind(task.recurrence_count_in_period)
        .bind(task.approver_id)
        .bind(task.approval_status.map(|s| s.to_string()))
        .bind(&task.approval_reason)
        .bind(task.completed_at)
        .fetch_one(executor)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "occurrence already generated for this series"))?;

    Task::try_from(row)
}

async fn lock_task(conn: &mut PgConnection, id: Id) -> RepositoryResult<Task> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, TaskRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::not_found("Task", id))?;
    Task::try_from(row)
}

/// Lock the series root (when there is one) before the task itself, so two
/// completions in the same series serialize on the root.
async fn lock_with_root(conn: &mut PgConnection, id: Id) -> RepositoryResult<(Task, Option<Task>)> {
    let parent: Option<Option<i64>> =
        sqlx::query_scalar("SELECT parent_task_id FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    let root = match parent {
        None => return Err(RepositoryError::not_found("Task", id)),
        Some(Some(root_id)) => Some(lock_task(&mut *conn, root_id).await?),
        Some(None) => None,
    };
    let task = lock_task(&mut *conn, id).await?;
    Ok((task, root))
}

async fn plan_and_insert(
    conn: &mut PgConnection,
    task: &Task,
    root: Option<&Task>,
    today: NaiveDate,
) -> RepositoryResult<Generated> {
    let root = root.unwrap_or(task);
    let Some(root_id) = root.id else {
        return Ok(Generated::skipped(SkipReason::NotRecurring));
    };

    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_task_id = $1 ORDER BY recurrence_count_in_period"
    );
    let instances = into_tasks(
        sqlx::query_as::<_, TaskRow>(&sql)
            .bind(root_id)
            .fetch_all(&mut *conn)
            .await?,
    )?;

    match plan_next_instance(task, root, &instances, today) {
        NextOccurrence::Create(next) => {
            let created = insert_task(&mut *conn, &next).await?;
            tracing::info!(
                task_id = ?task.id,
                next_id = ?created.id,
                due_date = ?created.due_date,
                occurrence = created.recurrence_count_in_period,
                "Generated next recurring task"
            );
            Ok(Generated::Created { task: created })
        }
        NextOccurrence::Skip(reason) => {
            tracing::debug!(task_id = ?task.id, %reason, "No next occurrence");
            Ok(Generated::skipped(reason))
        }
    }
}

/// Task repository implementation
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Task, Task, TaskChanges> for TaskRepository {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Task>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id DESC LIMIT $1 OFFSET $2");
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        into_tasks(rows)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn create(&self, task: Task) -> RepositoryResult<Task> {
        let created = insert_task(&self.pool, &task).await?;
        tracing::info!(task_id = ?created.id, "Created task");
        Ok(created)
    }

    async fn update(&self, id: Id, changes: TaskChanges) -> RepositoryResult<Task> {
        let sql = format!(
            r#"
            UPDATE tasks SET
                title = COALESCE($1, title),
                description = COALESCE($2, description),
                department_id = COALESCE($3, department_id),
                assignee_id = COALESCE($4, assignee_id),
                priority = COALESCE($5, priority),
                due_date = COALESCE($6, due_date),
                start_date = COALESCE($7, start_date),
                end_date = COALESCE($8, end_date),
                approver_id = COALESCE($9, approver_id),
                updated_at = NOW()
            WHERE id = $10
            RETURNING {TASK_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(&changes.title)
            .bind(&changes.description)
            .bind(changes.department_id)
            .bind(changes.assignee_id)
            .bind(changes.priority.map(|p| p.to_string()))
            .bind(changes.due_date)
            .bind(changes.start_date)
            .bind(changes.end_date)
            .bind(changes.approver_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Task", id))?;

        Task::try_from(row)
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("Task", id));
        }

        Ok(())
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn list(&self, filter: &TaskFilter, page: &PaginationParams) -> RepositoryResult<Page<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE {TASK_FILTER} \
             ORDER BY due_date ASC NULLS LAST, id DESC LIMIT $7 OFFSET $8"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.department_id)
            .bind(filter.assignee_id)
            .bind(filter.parent_task_id)
            .bind(filter.overdue_only)
            .bind(filter.include_templates)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM tasks WHERE {TASK_FILTER}");
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(filter.status.map(|s| s.to_string()))
            .bind(filter.department_id)
            .bind(filter.assignee_id)
            .bind(filter.parent_task_id)
            .bind(filter.overdue_only)
            .bind(filter.include_templates)
            .fetch_one(&self.pool)
            .await?;

        Ok(Page::new(into_tasks(rows)?, total, page))
    }

    async fn create_series(&self, template: Task) -> RepositoryResult<(Task, Task)> {
        let mut tx = self.pool.begin().await?;

        let root = insert_task(&mut *tx, &template).await?;
        let first = insert_task(&mut *tx, &first_instance(&root)).await?;

        tx.commit().await?;

        tracing::info!(root_id = ?root.id, first_id = ?first.id, "Created recurring series");
        Ok((root, first))
    }

    async fn instances(&self, root_id: Id) -> RepositoryResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE parent_task_id = $1 ORDER BY recurrence_count_in_period"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(root_id)
            .fetch_all(&self.pool)
            .await?;

        into_tasks(rows)
    }

    async fn update_status(&self, id: Id, status: TaskStatus) -> RepositoryResult<Task> {
        let sql = format!(
            r#"
            UPDATE tasks SET
                status = $1,
                completed_at = CASE WHEN $1 = 'completed' THEN COALESCE(completed_at, NOW()) ELSE NULL END,
                updated_at = NOW()
            WHERE id = $2
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(status.to_string())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Task", id))?;

        Task::try_from(row)
    }

    async fn complete_and_generate_next(&self, id: Id, completed_by: Id) -> RepositoryResult<Completion> {
        let today = Utc::now().date_naive();
        let mut tx = self.pool.begin().await?;

        let (task, root) = lock_with_root(&mut *tx, id).await?;
        if task.is_template() {
            return Err(RepositoryError::Conflict(
                "series templates cannot be completed".to_string(),
            ));
        }
        if task.status == TaskStatus::Completed {
            return Err(RepositoryError::Conflict("task is already completed".to_string()));
        }

        let sql = format!(
            r#"
            UPDATE tasks SET
                status = 'completed',
                completed_at = NOW(),
                approval_status = CASE WHEN approver_id IS NULL THEN NULL ELSE 'pending' END,
                approval_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        );
        let completed = Task::try_from(
            sqlx::query_as::<_, TaskRow>(&sql)
                .bind(id)
                .fetch_one(&mut *tx)
                .await?,
        )?;

        let next = if completed.is_instance() {
            plan_and_insert(&mut *tx, &completed, root.as_ref(), today).await?
        } else {
            Generated::skipped(SkipReason::NotRecurring)
        };

        tx.commit().await?;

        tracing::info!(task_id = id, completed_by, "Task completed");
        Ok(Completion { task: completed, next })
    }

    async fn generate_next_recurring(&self, id: Id) -> RepositoryResult<Generated> {
        let today = Utc::now().date_naive();
        let mut tx = self.pool.begin().await?;

        let (task, root) = lock_with_root(&mut *tx, id).await?;
        if task.status != TaskStatus::Completed {
            return Err(RepositoryError::Conflict(
                "only completed tasks generate a next occurrence".to_string(),
            ));
        }

        let generated = plan_and_insert(&mut *tx, &task, root.as_ref(), today).await?;
        tx.commit().await?;

        Ok(generated)
    }

    async fn mark_overdue(&self, today: NaiveDate) -> RepositoryResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = 'overdue', updated_at = NOW()
            WHERE status IN ('not-started', 'in-progress')
              AND due_date < $1
              AND NOT (is_recurring AND parent_task_id IS NULL)
            "#,
        )
        .bind(today)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn completed_series_heads(&self) -> RepositoryResult<Vec<Task>> {
        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS} FROM tasks t
            WHERE t.parent_task_id IS NOT NULL
              AND t.status = 'completed'
              AND t.recurrence_count_in_period = (
                  SELECT MAX(i.recurrence_count_in_period)
                  FROM tasks i
                  WHERE i.parent_task_id = t.parent_task_id
              )
            ORDER BY t.id
            "#
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        into_tasks(rows)
    }

    async fn record_decision(&self, id: Id, decision: TaskDecision) -> RepositoryResult<Task> {
        let sql = format!(
            r#"
            UPDATE tasks SET
                approval_status = $1,
                approval_reason = $2,
                status = CASE WHEN $1 = 'rejected' THEN 'in-progress' ELSE status END,
                completed_at = CASE WHEN $1 = 'rejected' THEN NULL ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $3 AND status = 'completed' AND approval_status = 'pending'
            RETURNING {TASK_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(decision.status.to_string())
            .bind(&decision.reason)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepositoryError::Conflict("task has no pending approval".to_string()))?;

        Task::try_from(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qms_models::{Frequency, TaskApprovalStatus, TaskPriority};

    fn row() -> TaskRow {
        let now = Utc::now();
        TaskRow {
            id: 3,
            title: "Weekly 5S walk".into(),
            description: None,
            department_id: Some(2),
            assignee_id: Some(5),
            created_by: Some(1),
            priority: "high".into(),
            due_date: NaiveDate::from_ymd_opt(2026, 2, 3),
            status: "in-progress".into(),
            is_recurring: true,
            frequency: Some("bi-weekly".into()),
            start_date: None,
            end_date: None,
            parent_task_id: Some(1),
            recurrence_count_in_period: 4,
            approver_id: Some(9),
            approval_status: Some("pending".into()),
            approval_reason: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let task = Task::try_from(row()).unwrap();
        assert_eq!(task.id, Some(3));
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.frequency, Some(Frequency::BiWeekly));
        assert_eq!(task.approval_status, Some(TaskApprovalStatus::Pending));
        assert!(task.is_instance());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let mut bad = row();
        bad.status = "done".into();
        let err = Task::try_from(bad).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidData(_)));
    }
}
