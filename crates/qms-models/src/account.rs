//! Account approval model
//!
//! Table: account_approvals

use chrono::{DateTime, Utc};
use qms_core::traits::{Id, Identifiable};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::team::MemberRole;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AccountApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// A sign-up parked until an administrator acts on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountApproval {
    pub id: Option<Id>,
    pub email: String,
    pub full_name: String,
    pub department_id: Option<Id>,
    pub requested_role: MemberRole,
    pub status: AccountApprovalStatus,
    pub reviewed_by: Option<Id>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl AccountApproval {
    pub fn is_pending(&self) -> bool {
        self.status == AccountApprovalStatus::Pending
    }
}

impl Identifiable for AccountApproval {
    fn id(&self) -> Option<Id> {
        self.id
    }
}
