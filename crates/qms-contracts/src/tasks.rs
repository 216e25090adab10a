//! Task contracts

use qms_core::error::ValidationErrors;
use qms_models::Task;

use crate::base::{validate_required, Contract, UserContext, ValidationResult};

/// Attribute and permission rules for tasks
pub struct TaskContract<'a, U: UserContext> {
    user: &'a U,
}

impl<'a, U: UserContext> TaskContract<'a, U> {
    pub fn new(user: &'a U) -> Self {
        Self { user }
    }

    /// Managers assign work to anyone; other users only to themselves
    pub fn can_create(&self, task: &Task) -> bool {
        self.user.is_manager()
            || task.assignee_id.map_or(true, |assignee| assignee == self.user.id())
    }

    pub fn can_edit(&self, task: &Task) -> bool {
        self.user.is_manager()
            || task.created_by == Some(self.user.id())
            || task.assignee_id == Some(self.user.id())
    }

    pub fn can_delete(&self, task: &Task) -> bool {
        self.user.is_manager() || task.created_by == Some(self.user.id())
    }

    /// Only the designated approver (or an admin) decides on a completed task
    pub fn can_decide_approval(&self, task: &Task) -> bool {
        self.user.is_admin() || task.approver_id == Some(self.user.id())
    }

    fn validate_recurrence(&self, task: &Task, errors: &mut ValidationErrors) {
        if task.is_recurring {
            if task.frequency.is_none() {
                errors.add("frequency", "is required for recurring tasks");
            }
            if task.start_date.is_none() && task.due_date.is_none() {
                errors.add("start_date", "is required for recurring tasks");
            }
        } else if task.frequency.is_some() && task.parent_task_id.is_none() {
            errors.add("frequency", "must be blank for one-off tasks");
        }
    }

    fn validate_dates(&self, task: &Task, errors: &mut ValidationErrors) {
        if let (Some(start), Some(end)) = (task.start_date, task.end_date) {
            if end < start {
                errors.add("end_date", "must be on or after the start date");
            }
        }
        if let (Some(start), Some(due)) = (task.start_date, task.due_date) {
            if due < start {
                errors.add("due_date", "must be on or after the start date");
            }
        }
    }
}

impl<'a, U: UserContext> Contract<Task> for TaskContract<'a, U> {
    fn validate(&self, task: &Task) -> ValidationResult {
        let mut errors = ValidationErrors::new();

        validate_required("title", &task.title, 255, &mut errors);
        self.validate_recurrence(task, &mut errors);
        self.validate_dates(task, &mut errors);

        if task.approval_reason.as_deref().map_or(false, |r| r.len() > 2000) {
            errors.add("approval_reason", "is too long (maximum is 2000 characters)");
        }

        errors.into_result()
    }
}
