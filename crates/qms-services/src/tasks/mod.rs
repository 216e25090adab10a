//! Task services
//!
//! `lifecycle` covers the user-facing operations, `automation` the periodic
//! overdue and recurrence sweep.

pub mod automation;
pub mod lifecycle;

pub use automation::{AutomationReport, TaskAutomationService};
pub use lifecycle::{StatusChange, TaskCreated, TaskService};

use chrono::NaiveDate;
use qms_core::traits::Id;
use qms_models::{Frequency, Task, TaskPriority};
use serde::Deserialize;

/// Attributes accepted when creating a task
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParams {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub department_id: Option<Id>,
    #[serde(default)]
    pub assignee_id: Option<Id>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub approver_id: Option<Id>,
}

impl TaskParams {
    pub fn into_task(self, created_by: Id) -> Task {
        Task {
            title: self.title.trim().to_string(),
            description: self.description,
            department_id: self.department_id,
            assignee_id: self.assignee_id,
            created_by: Some(created_by),
            priority: self.priority,
            due_date: self.due_date,
            is_recurring: self.is_recurring,
            frequency: self.frequency,
            start_date: self.start_date,
            end_date: self.end_date,
            approver_id: self.approver_id,
            ..Default::default()
        }
    }
}
