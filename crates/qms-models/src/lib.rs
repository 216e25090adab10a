//! # qms-models
//!
//! Domain models for QMS RS.
//!
//! Entities map to the QMS tables. Enumerations serialize to the kebab-case
//! strings stored in the database (`not-started`, `bi-weekly`, ...) and parse
//! back through `FromStr`.

pub use qms_core::traits::{DepartmentScoped, Id, Identifiable, Timestamped};

pub mod account;
pub mod audit;
pub mod document;
pub mod non_conformance;
pub mod otp;
pub mod recurrence;
pub mod task;
pub mod team;

pub use account::{AccountApproval, AccountApprovalStatus};
pub use audit::{Audit, AuditStatus};
pub use document::{
    ApprovalHierarchy, ApprovalRole, Document, DocumentRevision, HierarchyStatus,
};
pub use non_conformance::{NcStatus, NonConformance, Severity};
pub use otp::OtpCode;
pub use recurrence::{first_instance, is_overdue, next_occurrence, plan_next_instance, NextOccurrence, SkipReason};
pub use task::{Frequency, Period, Task, TaskApprovalStatus, TaskPriority, TaskStatus};
pub use team::{Department, MemberRole, MemberStatus, TeamMember};

/// Error returned when a stored enum value cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl std::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Parse a stored string into one of the model enums
pub fn parse_variant<T>(kind: &'static str, value: &str) -> Result<T, UnknownVariant>
where
    T: std::str::FromStr,
{
    value.parse().map_err(|_| UnknownVariant {
        kind,
        value: value.to_string(),
    })
}
