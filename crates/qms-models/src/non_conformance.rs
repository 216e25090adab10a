//! Non-conformance model
//!
//! Table: non_conformances

use chrono::{DateTime, NaiveDate, Utc};
use qms_core::traits::{DepartmentScoped, Id, Identifiable};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Severity {
    #[default]
    Minor,
    Major,
    Critical,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NcStatus {
    #[default]
    Open,
    UnderInvestigation,
    Closed,
}

impl NcStatus {
    pub fn can_advance_to(self, next: NcStatus) -> bool {
        use NcStatus::*;
        matches!(
            (self, next),
            (Open, UnderInvestigation) | (Open, Closed) | (UnderInvestigation, Closed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonConformance {
    pub id: Option<Id>,
    pub title: String,
    pub description: Option<String>,
    pub audit_id: Option<Id>,
    pub department_id: Option<Id>,
    pub severity: Severity,
    pub status: NcStatus,
    pub corrective_action: Option<String>,
    pub assignee_id: Option<Id>,
    pub due_date: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identifiable for NonConformance {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl DepartmentScoped for NonConformance {
    fn department_id(&self) -> Option<Id> {
        self.department_id
    }
}
