//! Task model
//!
//! Table: tasks
//!
//! A recurring series is a template row (`is_recurring = true`, no parent) plus
//! generated instance rows whose `parent_task_id` points back at the template.

use chrono::{DateTime, NaiveDate, Utc};
use qms_core::traits::{DepartmentScoped, Id, Identifiable, Timestamped};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Overdue,
}

impl TaskStatus {
    /// Statuses the overdue rule applies to
    pub fn is_open(self) -> bool {
        matches!(self, TaskStatus::NotStarted | TaskStatus::InProgress)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TaskApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// How often a recurring task repeats
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Frequency {
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Annually,
}

/// Calendar distance between two occurrences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Days(u64),
    Months(u32),
}

impl Frequency {
    pub fn period(self) -> Period {
        match self {
            Frequency::Daily => Period::Days(1),
            Frequency::Weekly => Period::Days(7),
            Frequency::BiWeekly => Period::Days(14),
            Frequency::Monthly => Period::Months(1),
            Frequency::Quarterly => Period::Months(3),
            Frequency::Annually => Period::Months(12),
        }
    }
}

/// Task entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Option<Id>,
    pub title: String,
    pub description: Option<String>,
    pub department_id: Option<Id>,
    pub assignee_id: Option<Id>,
    pub created_by: Option<Id>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub is_recurring: bool,
    pub frequency: Option<Frequency>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Series template this instance was generated from
    pub parent_task_id: Option<Id>,
    /// 1-based occurrence number within the series; 0 for templates and one-off tasks
    pub recurrence_count_in_period: i32,
    pub approver_id: Option<Id>,
    pub approval_status: Option<TaskApprovalStatus>,
    pub approval_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Template rows describe a series and are never worked on directly
    pub fn is_template(&self) -> bool {
        self.is_recurring && self.parent_task_id.is_none()
    }

    /// Generated occurrence of a recurring series
    pub fn is_instance(&self) -> bool {
        self.parent_task_id.is_some()
    }

    /// Id of the template the series hangs off
    pub fn series_root_id(&self) -> Option<Id> {
        self.parent_task_id.or(self.id)
    }
}

impl Identifiable for Task {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl Timestamped for Task {
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl DepartmentScoped for Task {
    fn department_id(&self) -> Option<Id> {
        self.department_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_status_strings() {
        assert_eq!(TaskStatus::NotStarted.to_string(), "not-started");
        assert_eq!("in-progress".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_frequency_strings_match_storage() {
        let stored: Vec<String> = Frequency::iter().map(|f| f.to_string()).collect();
        assert_eq!(
            stored,
            vec!["daily", "weekly", "bi-weekly", "monthly", "quarterly", "annually"]
        );
        assert_eq!(
            serde_json::to_string(&Frequency::BiWeekly).unwrap(),
            "\"bi-weekly\""
        );
    }

    #[test]
    fn test_open_statuses() {
        let open: Vec<TaskStatus> = TaskStatus::iter().filter(|s| s.is_open()).collect();
        assert_eq!(open, vec![TaskStatus::NotStarted, TaskStatus::InProgress]);
    }

    #[test]
    fn test_template_and_instance() {
        let mut template = Task::new("Calibrate scales");
        template.id = Some(10);
        template.is_recurring = true;
        assert!(template.is_template());
        assert_eq!(template.series_root_id(), Some(10));

        let mut instance = template.clone();
        instance.id = Some(11);
        instance.parent_task_id = Some(10);
        assert!(!instance.is_template());
        assert!(instance.is_instance());
        assert_eq!(instance.series_root_id(), Some(10));
    }
}
