//! Periodic task automation
//!
//! One sweep flags past-due open tasks as overdue, backfills the next
//! instance of every series whose latest instance is completed, and purges
//! expired one-time codes. Every step is idempotent so overlapping runs are
//! harmless.

use chrono::{NaiveDate, Utc};
use qms_core::QmsResult;
use qms_db::{Generated, RepositoryError, Stores};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// Counters from one automation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationReport {
    pub marked_overdue: u64,
    pub generated: u64,
    pub skipped: u64,
    pub errors: u64,
    pub expired_codes_removed: u64,
}

#[derive(Clone)]
pub struct TaskAutomationService {
    stores: Stores,
}

impl TaskAutomationService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, today: NaiveDate) -> QmsResult<AutomationReport> {
        let mut report = AutomationReport {
            marked_overdue: self.stores.tasks.mark_overdue(today).await?,
            ..Default::default()
        };

        for head in self.stores.tasks.completed_series_heads().await? {
            let Some(id) = head.id else { continue };
            match self.stores.tasks.generate_next_recurring(id).await {
                Ok(Generated::Created { task }) => {
                    debug!(task_id = id, next_id = ?task.id, due = ?task.due_date, "recurring instance generated");
                    report.generated += 1;
                }
                Ok(Generated::Skipped { reason }) => {
                    debug!(task_id = id, %reason, "recurring instance skipped");
                    report.skipped += 1;
                }
                // Another writer generated the same occurrence first
                Err(RepositoryError::Conflict(_)) => report.skipped += 1,
                Err(e) => {
                    warn!(task_id = id, error = %e, "recurring generation failed");
                    report.errors += 1;
                }
            }
        }

        match self.stores.otp.delete_expired(Utc::now()).await {
            Ok(removed) => report.expired_codes_removed = removed,
            Err(e) => warn!(error = %e, "purging expired codes failed"),
        }

        info!(
            marked_overdue = report.marked_overdue,
            generated = report.generated,
            skipped = report.skipped,
            errors = report.errors,
            "automation sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, Harness};
    use qms_db::TaskFilter;
    use qms_core::pagination::PaginationParams;
    use qms_db::repository::Repository;
    use qms_models::{Frequency, Task, TaskStatus};

    #[tokio::test]
    async fn test_sweep_marks_overdue_once() {
        let h = Harness::new();
        let mut late = Task::new("File monthly KPI");
        late.due_date = Some(date(2026, 3, 1));
        let late = h.stores.tasks.create(late).await.unwrap();
        let mut done = Task::new("Already handled");
        done.due_date = Some(date(2026, 3, 1));
        done.status = TaskStatus::Completed;
        h.stores.tasks.create(done).await.unwrap();

        let automation = h.services().automation;
        let first = automation.run(date(2026, 3, 10)).await.unwrap();
        assert_eq!(first.marked_overdue, 1);
        let second = automation.run(date(2026, 3, 10)).await.unwrap();
        assert_eq!(second.marked_overdue, 0);

        let reloaded = h.stores.tasks.find_by_id(late.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Overdue);
    }

    #[tokio::test]
    async fn test_sweep_backfills_completed_series() {
        let h = Harness::new();
        let mut template = Task::new("Daily temperature log");
        template.is_recurring = true;
        template.frequency = Some(Frequency::Daily);
        template.start_date = Some(date(2026, 4, 1));
        let (root, first) = h.stores.tasks.create_series(template).await.unwrap();

        // Completed outside the transactional path, so no successor exists yet
        h.stores
            .tasks
            .update_status(first.id.unwrap(), TaskStatus::Completed)
            .await
            .unwrap();

        let automation = h.services().automation;
        let report = automation.run(date(2026, 4, 1)).await.unwrap();
        assert_eq!(report.generated, 1);
        assert_eq!(report.errors, 0);

        let again = automation.run(date(2026, 4, 1)).await.unwrap();
        assert_eq!(again.generated, 0);

        let filter = TaskFilter {
            parent_task_id: root.id,
            ..Default::default()
        };
        let page = h.stores.tasks.list(&filter, &PaginationParams::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }
}
