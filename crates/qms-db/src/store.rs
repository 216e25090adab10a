//! Store traits
//!
//! Each aggregate is reached through a trait so services run against
//! PostgreSQL in production and against [`crate::memory::MemoryStore`] in tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{
    AccountApproval, AccountApprovalStatus, ApprovalHierarchy, Audit, AuditStatus, Department,
    Document, DocumentRevision, HierarchyStatus, MemberRole, MemberStatus, NcStatus,
    NonConformance, OtpCode, Severity, SkipReason, Task, TaskApprovalStatus, TaskPriority,
    TaskStatus, TeamMember,
};
use serde::Serialize;

use crate::reports::{DashboardStats, TableCount};
use crate::repository::{Repository, RepositoryResult};

// ============================================================================
// Tasks
// ============================================================================

/// Filters for task listings
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub department_id: Option<Id>,
    pub assignee_id: Option<Id>,
    pub parent_task_id: Option<Id>,
    /// Only rows whose status is `overdue`
    pub overdue_only: bool,
    /// Include series templates (hidden by default)
    pub include_templates: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.department_id.map_or(true, |d| task.department_id == Some(d))
            && self.assignee_id.map_or(true, |a| task.assignee_id == Some(a))
            && self.parent_task_id.map_or(true, |p| task.parent_task_id == Some(p))
            && (!self.overdue_only || task.status == TaskStatus::Overdue)
            && (self.include_templates || !task.is_template())
    }
}

/// Attribute changes for a task; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department_id: Option<Id>,
    pub assignee_id: Option<Id>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub approver_id: Option<Id>,
}

impl TaskChanges {
    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if self.department_id.is_some() {
            task.department_id = self.department_id;
        }
        if self.assignee_id.is_some() {
            task.assignee_id = self.assignee_id;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if self.due_date.is_some() {
            task.due_date = self.due_date;
        }
        if self.start_date.is_some() {
            task.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            task.end_date = self.end_date;
        }
        if self.approver_id.is_some() {
            task.approver_id = self.approver_id;
        }
    }
}

/// What happened when the next occurrence of a series was requested
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Generated {
    Created { task: Task },
    Skipped { reason: SkipReason },
}

impl Generated {
    pub fn skipped(reason: SkipReason) -> Self {
        Generated::Skipped { reason }
    }

    pub fn created(&self) -> Option<&Task> {
        match self {
            Generated::Created { task } => Some(task),
            Generated::Skipped { .. } => None,
        }
    }
}

/// Result of completing a task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub task: Task,
    pub next: Generated,
}

/// Approval decision recorded on a completed task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDecision {
    pub status: TaskApprovalStatus,
    pub reason: Option<String>,
}

#[async_trait]
pub trait TaskStore: Repository<Task, Task, TaskChanges> {
    async fn list(&self, filter: &TaskFilter, page: &PaginationParams) -> RepositoryResult<Page<Task>>;

    /// Insert a series template together with its first instance
    async fn create_series(&self, template: Task) -> RepositoryResult<(Task, Task)>;

    /// Every instance generated for a template, oldest first
    async fn instances(&self, root_id: Id) -> RepositoryResult<Vec<Task>>;

    /// Plain status change; completion goes through `complete_and_generate_next`
    async fn update_status(&self, id: Id, status: TaskStatus) -> RepositoryResult<Task>;

    /// Complete a task and, for recurring series, insert the next instance atomically
    async fn complete_and_generate_next(&self, id: Id, completed_by: Id) -> RepositoryResult<Completion>;

    /// Insert the instance following an already completed task
    async fn generate_next_recurring(&self, id: Id) -> RepositoryResult<Generated>;

    /// Flag open, past-due, non-template tasks as overdue
    async fn mark_overdue(&self, today: NaiveDate) -> RepositoryResult<u64>;

    /// Latest instance of each series when that instance is completed
    async fn completed_series_heads(&self) -> RepositoryResult<Vec<Task>>;

    async fn record_decision(&self, id: Id, decision: TaskDecision) -> RepositoryResult<Task>;
}

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub status: Option<HierarchyStatus>,
    pub department_id: Option<Id>,
    pub owner_id: Option<Id>,
}

impl DocumentFilter {
    pub fn matches(&self, document: &Document) -> bool {
        self.status.map_or(true, |s| document.status == s)
            && self.department_id.map_or(true, |d| document.department_id == Some(d))
            && self.owner_id.map_or(true, |o| document.owner_id == o)
    }
}

/// File metadata for a new revision
#[derive(Debug, Clone)]
pub struct NewRevision {
    pub file_path: String,
    pub file_name: String,
    pub change_summary: Option<String>,
    pub uploaded_by: Id,
}

/// Sign-off participants for a revision
#[derive(Debug, Clone, Copy)]
pub struct Participants {
    pub initiator_id: Id,
    pub checker_id: Id,
    pub approver_id: Id,
}

/// A document with its current revision and that revision's hierarchy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    pub document: Document,
    pub revision: DocumentRevision,
    pub hierarchy: ApprovalHierarchy,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(
        &self,
        document: Document,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail>;

    async fn find_document(&self, id: Id) -> RepositoryResult<Option<Document>>;

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<Document>>;

    async fn revisions(&self, document_id: Id) -> RepositoryResult<Vec<DocumentRevision>>;

    /// Hierarchy of the document's current revision
    async fn current_hierarchy(&self, document_id: Id) -> RepositoryResult<Option<ApprovalHierarchy>>;

    /// Persist a hierarchy whose stored status is still `from`; `Conflict` otherwise
    async fn save_transition(
        &self,
        hierarchy: &ApprovalHierarchy,
        from: HierarchyStatus,
    ) -> RepositoryResult<ApprovalHierarchy>;

    /// Append a revision with a fresh draft hierarchy and make it current
    async fn add_revision(
        &self,
        document_id: Id,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail>;
}

// ============================================================================
// Accounts and one-time codes
// ============================================================================

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_request(&self, request: AccountApproval) -> RepositoryResult<AccountApproval>;

    async fn find_request(&self, id: Id) -> RepositoryResult<Option<AccountApproval>>;

    async fn find_pending_by_email(&self, email: &str) -> RepositoryResult<Option<AccountApproval>>;

    async fn list_requests(
        &self,
        status: Option<AccountApprovalStatus>,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<AccountApproval>>;

    /// Move a pending request to its final state; `Conflict` when already decided
    async fn decide(
        &self,
        id: Id,
        status: AccountApprovalStatus,
        reviewed_by: Option<Id>,
        reason: Option<String>,
    ) -> RepositoryResult<AccountApproval>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> RepositoryResult<OtpCode>;

    /// Newest unverified, unexpired code for the address
    async fn latest_usable(&self, email: &str, now: DateTime<Utc>) -> RepositoryResult<Option<OtpCode>>;

    /// Returns false when the code was verified concurrently
    async fn mark_verified(&self, id: Id) -> RepositoryResult<bool>;

    /// Count a wrong guess and burn the code once `max_attempts` is reached.
    /// Returns the number of failed attempts so far.
    async fn record_failed_attempt(&self, id: Id, max_attempts: i32) -> RepositoryResult<i32>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64>;
}

// ============================================================================
// Team members and departments
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    pub role: Option<MemberRole>,
    pub status: Option<MemberStatus>,
    pub department_id: Option<Id>,
}

impl MemberFilter {
    pub fn matches(&self, member: &TeamMember) -> bool {
        self.role.map_or(true, |r| member.role == r)
            && self.status.map_or(true, |s| member.status == s)
            && self.department_id.map_or(true, |d| member.department_id == Some(d))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemberChanges {
    pub full_name: Option<String>,
    pub role: Option<MemberRole>,
    pub department_id: Option<Id>,
    pub status: Option<MemberStatus>,
    pub hrone_employee_code: Option<String>,
}

impl MemberChanges {
    pub fn apply(&self, member: &mut TeamMember) {
        if let Some(name) = &self.full_name {
            member.full_name = name.clone();
        }
        if let Some(role) = self.role {
            member.role = role;
        }
        if self.department_id.is_some() {
            member.department_id = self.department_id;
        }
        if let Some(status) = self.status {
            member.status = status;
        }
        if let Some(code) = &self.hrone_employee_code {
            member.hrone_employee_code = Some(code.clone());
        }
    }
}

/// Row written by an upsert, and whether it was newly inserted
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted<T> {
    pub value: T,
    pub created: bool,
}

#[async_trait]
pub trait MemberStore: Repository<TeamMember, TeamMember, MemberChanges> {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<TeamMember>>;

    async fn list(
        &self,
        filter: &MemberFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<TeamMember>>;

    /// Active members holding any of the given roles
    async fn active_with_roles(&self, roles: &[MemberRole]) -> RepositoryResult<Vec<TeamMember>>;

    /// Insert, or update name/department/status/HR code of the member with the same e-mail
    async fn upsert_by_email(&self, member: TeamMember) -> RepositoryResult<Upserted<TeamMember>>;
}

#[derive(Debug, Clone, Default)]
pub struct DepartmentChanges {
    pub name: Option<String>,
    pub code: Option<String>,
}

#[async_trait]
pub trait DepartmentStore: Repository<Department, Department, DepartmentChanges> {
    async fn list_all(&self) -> RepositoryResult<Vec<Department>>;

    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Department>>;

    /// Insert, or rename the department carrying the same HROne id
    async fn upsert_by_hrone_id(&self, department: Department) -> RepositoryResult<Upserted<Department>>;
}

// ============================================================================
// Audits and non-conformances
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub status: Option<AuditStatus>,
    pub department_id: Option<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditChanges {
    pub title: Option<String>,
    pub auditor_id: Option<Id>,
    pub scheduled_date: Option<NaiveDate>,
    pub status: Option<AuditStatus>,
    pub findings: Option<String>,
}

#[async_trait]
pub trait AuditStore: Repository<Audit, Audit, AuditChanges> {
    async fn list(&self, filter: &AuditFilter, page: &PaginationParams) -> RepositoryResult<Page<Audit>>;
}

#[derive(Debug, Clone, Default)]
pub struct NcFilter {
    pub status: Option<NcStatus>,
    pub severity: Option<Severity>,
    pub department_id: Option<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct NcChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<NcStatus>,
    pub corrective_action: Option<String>,
    pub assignee_id: Option<Id>,
    pub due_date: Option<NaiveDate>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait NonConformanceStore: Repository<NonConformance, NonConformance, NcChanges> {
    async fn list(
        &self,
        filter: &NcFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<NonConformance>>;
}

// ============================================================================
// Reporting
// ============================================================================

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn dashboard_stats(&self, today: NaiveDate) -> RepositoryResult<DashboardStats>;

    async fn table_counts(&self) -> RepositoryResult<Vec<TableCount>>;
}
