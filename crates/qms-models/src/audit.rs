//! Audit model
//!
//! Table: audits

use chrono::{DateTime, NaiveDate, Utc};
use qms_core::traits::{DepartmentScoped, Id, Identifiable};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AuditStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl AuditStatus {
    pub fn can_advance_to(self, next: AuditStatus) -> bool {
        use AuditStatus::*;
        matches!(
            (self, next),
            (Planned, InProgress) | (Planned, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub id: Option<Id>,
    pub title: String,
    pub department_id: Option<Id>,
    pub auditor_id: Option<Id>,
    pub scheduled_date: NaiveDate,
    pub status: AuditStatus,
    pub findings: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identifiable for Audit {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl DepartmentScoped for Audit {
    fn department_id(&self) -> Option<Id> {
        self.department_id
    }
}
