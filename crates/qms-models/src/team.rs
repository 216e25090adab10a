//! Team members and departments
//!
//! Tables: team_members, departments

use chrono::{DateTime, Utc};
use qms_core::traits::{DepartmentScoped, Id, Identifiable};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MemberRole {
    Admin,
    Manager,
    #[default]
    User,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MemberStatus {
    #[default]
    Invited,
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: Option<Id>,
    pub full_name: String,
    pub email: String,
    pub role: MemberRole,
    pub department_id: Option<Id>,
    pub status: MemberStatus,
    /// Employee code in the HR system, set by the HROne import
    #[validate(length(max = 64))]
    pub hrone_employee_code: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TeamMember {
    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

impl Identifiable for TeamMember {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl DepartmentScoped for TeamMember {
    fn department_id(&self) -> Option<Id> {
        self.department_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: Option<Id>,
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    #[validate(length(max = 64))]
    pub hrone_department_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Identifiable for Department {
    fn id(&self) -> Option<Id> {
        self.id
    }
}
