//! Document, revision and approval hierarchy models
//!
//! Tables: documents, document_revisions, approval_hierarchy
//!
//! Every revision carries its own hierarchy. The hierarchy walks
//! draft -> pending-checker -> pending-approval -> approved, and can be
//! rejected from either pending stage. It never moves backwards.

use chrono::{DateTime, Utc};
use qms_core::traits::{DepartmentScoped, Id, Identifiable};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HierarchyStatus {
    #[default]
    Draft,
    PendingChecker,
    PendingApproval,
    Approved,
    Rejected,
}

impl HierarchyStatus {
    /// Position in the sign-off sequence; both terminal states share the last rank
    pub fn rank(self) -> u8 {
        match self {
            HierarchyStatus::Draft => 0,
            HierarchyStatus::PendingChecker => 1,
            HierarchyStatus::PendingApproval => 2,
            HierarchyStatus::Approved | HierarchyStatus::Rejected => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, HierarchyStatus::Approved | HierarchyStatus::Rejected)
    }

    /// Whether moving to `next` keeps the sequence monotonic
    pub fn can_advance_to(self, next: HierarchyStatus) -> bool {
        use HierarchyStatus::*;
        matches!(
            (self, next),
            (Draft, PendingChecker)
                | (PendingChecker, PendingApproval)
                | (PendingChecker, Rejected)
                | (PendingApproval, Approved)
                | (PendingApproval, Rejected)
        )
    }
}

/// Sign-off role within a hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApprovalRole {
    Initiator,
    Checker,
    Approver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Option<Id>,
    pub title: String,
    pub document_number: String,
    pub department_id: Option<Id>,
    pub owner_id: Id,
    pub current_revision_id: Option<Id>,
    /// Status of the current revision's hierarchy
    pub status: HierarchyStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identifiable for Document {
    fn id(&self) -> Option<Id> {
        self.id
    }
}

impl DepartmentScoped for Document {
    fn department_id(&self) -> Option<Id> {
        self.department_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRevision {
    pub id: Option<Id>,
    pub document_id: Id,
    pub revision_number: i32,
    pub file_path: String,
    pub file_name: String,
    pub change_summary: Option<String>,
    pub uploaded_by: Id,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalHierarchy {
    pub id: Option<Id>,
    pub document_id: Id,
    pub revision_id: Id,
    pub initiator_id: Id,
    pub checker_id: Id,
    pub approver_id: Id,
    pub initiator_approved: bool,
    pub initiator_approved_at: Option<DateTime<Utc>>,
    pub checker_approved: bool,
    pub checker_approved_at: Option<DateTime<Utc>>,
    pub approver_approved: bool,
    pub approver_approved_at: Option<DateTime<Utc>>,
    pub status: HierarchyStatus,
    pub rejection_reason: Option<String>,
    pub rejected_by: Option<Id>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ApprovalHierarchy {
    pub fn draft(document_id: Id, revision_id: Id, initiator_id: Id, checker_id: Id, approver_id: Id) -> Self {
        Self {
            id: None,
            document_id,
            revision_id,
            initiator_id,
            checker_id,
            approver_id,
            initiator_approved: false,
            initiator_approved_at: None,
            checker_approved: false,
            checker_approved_at: None,
            approver_approved: false,
            approver_approved_at: None,
            status: HierarchyStatus::Draft,
            rejection_reason: None,
            rejected_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Roles the given user holds on this hierarchy
    pub fn roles_of(&self, user_id: Id) -> Vec<ApprovalRole> {
        let mut roles = Vec::new();
        if self.initiator_id == user_id {
            roles.push(ApprovalRole::Initiator);
        }
        if self.checker_id == user_id {
            roles.push(ApprovalRole::Checker);
        }
        if self.approver_id == user_id {
            roles.push(ApprovalRole::Approver);
        }
        roles
    }

    /// User expected to act next, if any
    pub fn next_actor(&self) -> Option<Id> {
        match self.status {
            HierarchyStatus::Draft => Some(self.initiator_id),
            HierarchyStatus::PendingChecker => Some(self.checker_id),
            HierarchyStatus::PendingApproval => Some(self.approver_id),
            HierarchyStatus::Approved | HierarchyStatus::Rejected => None,
        }
    }
}
