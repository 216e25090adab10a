//! In-memory store
//!
//! Implements every store trait over plain vectors behind a mutex. It follows
//! the same rules as the Postgres repositories (unique keys, conditional
//! transitions, the recurrence planner) and backs service and router tests.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_models::{
    first_instance, is_overdue, plan_next_instance, AccountApproval, AccountApprovalStatus,
    ApprovalHierarchy, Audit, Department, Document, DocumentRevision, HierarchyStatus, MemberRole,
    MemberStatus, NcStatus, NextOccurrence, NonConformance, OtpCode, SkipReason, Task,
    TaskApprovalStatus, TaskStatus, TeamMember,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::reports::{DashboardStats, DepartmentTaskCount, TableCount, QMS_TABLES, UNASSIGNED_DEPARTMENT};
use crate::repository::{Repository, RepositoryError, RepositoryResult};
use crate::store::*;

#[derive(Debug, Default)]
struct MemoryState {
    last_id: Id,
    tasks: Vec<Task>,
    documents: Vec<Document>,
    revisions: Vec<DocumentRevision>,
    hierarchies: Vec<ApprovalHierarchy>,
    accounts: Vec<AccountApproval>,
    otp_codes: Vec<OtpCode>,
    members: Vec<TeamMember>,
    departments: Vec<Department>,
    audits: Vec<Audit>,
    non_conformances: Vec<NonConformance>,
}

impl MemoryState {
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    fn task(&self, id: Id) -> RepositoryResult<&Task> {
        self.tasks
            .iter()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("Task", id))
    }

    fn task_mut(&mut self, id: Id) -> RepositoryResult<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("Task", id))
    }

    fn insert_task(&mut self, mut task: Task) -> RepositoryResult<Task> {
        if let Some(parent) = task.parent_task_id {
            let taken = self.tasks.iter().any(|t| {
                t.parent_task_id == Some(parent)
                    && t.recurrence_count_in_period == task.recurrence_count_in_period
            });
            if taken {
                return Err(RepositoryError::Conflict(
                    "occurrence already generated for this series".to_string(),
                ));
            }
        }
        let now = Utc::now();
        task.id = Some(self.next_id());
        task.created_at = Some(now);
        task.updated_at = Some(now);
        self.tasks.push(task.clone());
        Ok(task)
    }

    fn instances_of(&self, root_id: Id) -> Vec<Task> {
        let mut instances: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.parent_task_id == Some(root_id))
            .cloned()
            .collect();
        instances.sort_by_key(|t| t.recurrence_count_in_period);
        instances
    }

    fn plan_and_insert(&mut self, task: &Task, today: NaiveDate) -> RepositoryResult<Generated> {
        let Some(root_id) = task.parent_task_id else {
            return Ok(Generated::skipped(SkipReason::NotRecurring));
        };
        let root = self.task(root_id)?.clone();
        let instances = self.instances_of(root_id);

        match plan_next_instance(task, &root, &instances, today) {
            NextOccurrence::Create(next) => Ok(Generated::Created {
                task: self.insert_task(next)?,
            }),
            NextOccurrence::Skip(reason) => Ok(Generated::skipped(reason)),
        }
    }

    fn attach_revision(
        &mut self,
        document_id: Id,
        revision_number: i32,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail> {
        let now = Utc::now();
        let revision = DocumentRevision {
            id: Some(self.next_id()),
            document_id,
            revision_number,
            file_path: revision.file_path,
            file_name: revision.file_name,
            change_summary: revision.change_summary,
            uploaded_by: revision.uploaded_by,
            created_at: Some(now),
        };
        self.revisions.push(revision.clone());

        let mut hierarchy = ApprovalHierarchy::draft(
            document_id,
            revision.id.unwrap_or_default(),
            participants.initiator_id,
            participants.checker_id,
            participants.approver_id,
        );
        hierarchy.id = Some(self.next_id());
        hierarchy.created_at = Some(now);
        hierarchy.updated_at = Some(now);
        self.hierarchies.push(hierarchy.clone());

        let document = self
            .documents
            .iter_mut()
            .find(|d| d.id == Some(document_id))
            .ok_or_else(|| RepositoryError::not_found("Document", document_id))?;
        document.current_revision_id = revision.id;
        document.status = HierarchyStatus::Draft;
        document.updated_at = Some(now);

        Ok(DocumentDetail {
            document: document.clone(),
            revision,
            hierarchy,
        })
    }
}

fn paginate<T>(items: Vec<T>, page: &PaginationParams) -> Page<T> {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    Page::new(items, total, page)
}

fn window<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

/// Shared in-memory backing for every store trait
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tasks
// ============================================================================

#[async_trait]
impl Repository<Task, Task, TaskChanges> for MemoryStore {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Task>> {
        Ok(self.lock().tasks.iter().find(|t| t.id == Some(id)).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Task>> {
        let mut tasks = self.lock().tasks.clone();
        tasks.reverse();
        Ok(window(&tasks, limit, offset))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.lock().tasks.len() as i64)
    }

    async fn create(&self, task: Task) -> RepositoryResult<Task> {
        self.lock().insert_task(task)
    }

    async fn update(&self, id: Id, changes: TaskChanges) -> RepositoryResult<Task> {
        let mut state = self.lock();
        let task = state.task_mut(id)?;
        changes.apply(task);
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let mut state = self.lock();
        state.task(id)?;
        state
            .tasks
            .retain(|t| t.id != Some(id) && t.parent_task_id != Some(id));
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list(&self, filter: &TaskFilter, page: &PaginationParams) -> RepositoryResult<Page<Task>> {
        let mut tasks: Vec<Task> = self
            .lock()
            .tasks
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y).then(b.id.cmp(&a.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        Ok(paginate(tasks, page))
    }

    async fn create_series(&self, template: Task) -> RepositoryResult<(Task, Task)> {
        let mut state = self.lock();
        let root = state.insert_task(template)?;
        let first = state.insert_task(first_instance(&root))?;
        Ok((root, first))
    }

    async fn instances(&self, root_id: Id) -> RepositoryResult<Vec<Task>> {
        Ok(self.lock().instances_of(root_id))
    }

    async fn update_status(&self, id: Id, status: TaskStatus) -> RepositoryResult<Task> {
        let mut state = self.lock();
        let task = state.task_mut(id)?;
        task.status = status;
        task.completed_at = match status {
            TaskStatus::Completed => task.completed_at.or(Some(Utc::now())),
            _ => None,
        };
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }

    async fn complete_and_generate_next(&self, id: Id, _completed_by: Id) -> RepositoryResult<Completion> {
        let today = Utc::now().date_naive();
        let mut state = self.lock();

        let task = state.task_mut(id)?;
        if task.is_template() {
            return Err(RepositoryError::Conflict(
                "series templates cannot be completed".to_string(),
            ));
        }
        if task.status == TaskStatus::Completed {
            return Err(RepositoryError::Conflict("task is already completed".to_string()));
        }

        task.status = TaskStatus::Completed;
        task.completed_at = Some(Utc::now());
        task.approval_status = task.approver_id.map(|_| TaskApprovalStatus::Pending);
        task.approval_reason = None;
        task.updated_at = Some(Utc::now());
        let completed = task.clone();

        let next = state.plan_and_insert(&completed, today)?;
        Ok(Completion { task: completed, next })
    }

    async fn generate_next_recurring(&self, id: Id) -> RepositoryResult<Generated> {
        let today = Utc::now().date_naive();
        let mut state = self.lock();

        let task = state.task(id)?.clone();
        if task.status != TaskStatus::Completed {
            return Err(RepositoryError::Conflict(
                "only completed tasks generate a next occurrence".to_string(),
            ));
        }
        state.plan_and_insert(&task, today)
    }

    async fn mark_overdue(&self, today: NaiveDate) -> RepositoryResult<u64> {
        let mut state = self.lock();
        let mut marked = 0;
        for task in state.tasks.iter_mut().filter(|t| is_overdue(t, today)) {
            task.status = TaskStatus::Overdue;
            task.updated_at = Some(Utc::now());
            marked += 1;
        }
        Ok(marked)
    }

    async fn completed_series_heads(&self) -> RepositoryResult<Vec<Task>> {
        let state = self.lock();
        let mut heads: BTreeMap<Id, &Task> = BTreeMap::new();
        for task in &state.tasks {
            if let Some(parent) = task.parent_task_id {
                let head = heads.entry(parent).or_insert(task);
                if task.recurrence_count_in_period > head.recurrence_count_in_period {
                    *head = task;
                }
            }
        }
        Ok(heads
            .into_values()
            .filter(|t| t.status == TaskStatus::Completed)
            .cloned()
            .collect())
    }

    async fn record_decision(&self, id: Id, decision: TaskDecision) -> RepositoryResult<Task> {
        let mut state = self.lock();
        let task = state.task_mut(id)?;
        if task.status != TaskStatus::Completed
            || task.approval_status != Some(TaskApprovalStatus::Pending)
        {
            return Err(RepositoryError::Conflict("task has no pending approval".to_string()));
        }

        task.approval_status = Some(decision.status);
        task.approval_reason = decision.reason;
        if decision.status == TaskApprovalStatus::Rejected {
            task.status = TaskStatus::InProgress;
            task.completed_at = None;
        }
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }
}

// ============================================================================
// Documents
// ============================================================================

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        mut document: Document,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail> {
        let mut state = self.lock();
        if state
            .documents
            .iter()
            .any(|d| d.document_number == document.document_number)
        {
            return Err(RepositoryError::Conflict("document number already in use".to_string()));
        }

        let now = Utc::now();
        let id = state.next_id();
        document.id = Some(id);
        document.status = HierarchyStatus::Draft;
        document.created_at = Some(now);
        document.updated_at = Some(now);
        state.documents.push(document);

        state.attach_revision(id, 1, revision, participants)
    }

    async fn find_document(&self, id: Id) -> RepositoryResult<Option<Document>> {
        Ok(self.lock().documents.iter().find(|d| d.id == Some(id)).cloned())
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<Document>> {
        let mut documents: Vec<Document> = self
            .lock()
            .documents
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(paginate(documents, page))
    }

    async fn revisions(&self, document_id: Id) -> RepositoryResult<Vec<DocumentRevision>> {
        let mut revisions: Vec<DocumentRevision> = self
            .lock()
            .revisions
            .iter()
            .filter(|r| r.document_id == document_id)
            .cloned()
            .collect();
        revisions.sort_by_key(|r| r.revision_number);
        Ok(revisions)
    }

    async fn current_hierarchy(&self, document_id: Id) -> RepositoryResult<Option<ApprovalHierarchy>> {
        let state = self.lock();
        let current = state
            .documents
            .iter()
            .find(|d| d.id == Some(document_id))
            .and_then(|d| d.current_revision_id);
        Ok(current.and_then(|revision_id| {
            state
                .hierarchies
                .iter()
                .find(|h| h.revision_id == revision_id)
                .cloned()
        }))
    }

    async fn save_transition(
        &self,
        hierarchy: &ApprovalHierarchy,
        from: HierarchyStatus,
    ) -> RepositoryResult<ApprovalHierarchy> {
        let mut state = self.lock();
        let stored = state
            .hierarchies
            .iter_mut()
            .find(|h| h.id.is_some() && h.id == hierarchy.id)
            .ok_or_else(|| RepositoryError::Validation("hierarchy has not been saved".to_string()))?;
        if stored.status != from {
            return Err(RepositoryError::Conflict(format!("approval is no longer {}", from)));
        }

        let created_at = stored.created_at;
        *stored = ApprovalHierarchy {
            created_at,
            updated_at: Some(Utc::now()),
            ..hierarchy.clone()
        };
        let saved = stored.clone();

        if let Some(document) = state
            .documents
            .iter_mut()
            .find(|d| d.id == Some(saved.document_id) && d.current_revision_id == Some(saved.revision_id))
        {
            document.status = saved.status;
            document.updated_at = Some(Utc::now());
        }
        Ok(saved)
    }

    async fn add_revision(
        &self,
        document_id: Id,
        revision: NewRevision,
        participants: Participants,
    ) -> RepositoryResult<DocumentDetail> {
        let mut state = self.lock();
        if !state.documents.iter().any(|d| d.id == Some(document_id)) {
            return Err(RepositoryError::not_found("Document", document_id));
        }
        let number = state
            .revisions
            .iter()
            .filter(|r| r.document_id == document_id)
            .map(|r| r.revision_number)
            .max()
            .unwrap_or(0)
            + 1;
        state.attach_revision(document_id, number, revision, participants)
    }
}

// ============================================================================
// Accounts and one-time codes
// ============================================================================

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_request(&self, mut request: AccountApproval) -> RepositoryResult<AccountApproval> {
        let mut state = self.lock();
        if state
            .accounts
            .iter()
            .any(|a| a.is_pending() && a.email.eq_ignore_ascii_case(&request.email))
        {
            return Err(RepositoryError::Conflict(
                "a sign-up request for this e-mail is already pending".to_string(),
            ));
        }
        request.id = Some(state.next_id());
        request.status = AccountApprovalStatus::Pending;
        request.created_at = Some(Utc::now());
        state.accounts.push(request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: Id) -> RepositoryResult<Option<AccountApproval>> {
        Ok(self.lock().accounts.iter().find(|a| a.id == Some(id)).cloned())
    }

    async fn find_pending_by_email(&self, email: &str) -> RepositoryResult<Option<AccountApproval>> {
        Ok(self
            .lock()
            .accounts
            .iter()
            .find(|a| a.is_pending() && a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_requests(
        &self,
        status: Option<AccountApprovalStatus>,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<AccountApproval>> {
        let mut requests: Vec<AccountApproval> = self
            .lock()
            .accounts
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        requests.reverse();
        Ok(paginate(requests, page))
    }

    async fn decide(
        &self,
        id: Id,
        status: AccountApprovalStatus,
        reviewed_by: Option<Id>,
        reason: Option<String>,
    ) -> RepositoryResult<AccountApproval> {
        let mut state = self.lock();
        let request = state
            .accounts
            .iter_mut()
            .find(|a| a.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("AccountApproval", id))?;
        if !request.is_pending() {
            return Err(RepositoryError::Conflict(
                "sign-up request has already been decided".to_string(),
            ));
        }
        request.status = status;
        request.reviewed_by = reviewed_by;
        request.reviewed_at = Some(Utc::now());
        request.rejection_reason = reason;
        Ok(request.clone())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn insert_code(
        &self,
        email: &str,
        code: &str,
        expires_at: chrono::DateTime<Utc>,
    ) -> RepositoryResult<OtpCode> {
        let mut state = self.lock();
        let otp = OtpCode {
            id: Some(state.next_id()),
            email: email.to_string(),
            code: code.to_string(),
            expires_at,
            verified: false,
            failed_attempts: 0,
            created_at: Some(Utc::now()),
        };
        state.otp_codes.push(otp.clone());
        Ok(otp)
    }

    async fn latest_usable(
        &self,
        email: &str,
        now: chrono::DateTime<Utc>,
    ) -> RepositoryResult<Option<OtpCode>> {
        Ok(self
            .lock()
            .otp_codes
            .iter()
            .filter(|c| c.email.eq_ignore_ascii_case(email) && c.is_usable(now))
            .max_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn mark_verified(&self, id: Id) -> RepositoryResult<bool> {
        let mut state = self.lock();
        match state.otp_codes.iter_mut().find(|c| c.id == Some(id) && !c.verified) {
            Some(code) => {
                code.verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failed_attempt(&self, id: Id, max_attempts: i32) -> RepositoryResult<i32> {
        let mut state = self.lock();
        let code = state
            .otp_codes
            .iter_mut()
            .find(|c| c.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("OtpCode", id))?;
        code.failed_attempts += 1;
        if code.failed_attempts >= max_attempts {
            code.verified = true;
        }
        Ok(code.failed_attempts)
    }

    async fn delete_expired(&self, now: chrono::DateTime<Utc>) -> RepositoryResult<u64> {
        let mut state = self.lock();
        let before = state.otp_codes.len();
        state.otp_codes.retain(|c| !c.is_expired(now));
        Ok((before - state.otp_codes.len()) as u64)
    }
}

// ============================================================================
// Team members and departments
// ============================================================================

#[async_trait]
impl Repository<TeamMember, TeamMember, MemberChanges> for MemoryStore {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<TeamMember>> {
        Ok(self.lock().members.iter().find(|m| m.id == Some(id)).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<TeamMember>> {
        let mut members = self.lock().members.clone();
        members.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(window(&members, limit, offset))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.lock().members.len() as i64)
    }

    async fn create(&self, mut member: TeamMember) -> RepositoryResult<TeamMember> {
        let mut state = self.lock();
        if state
            .members
            .iter()
            .any(|m| m.email.eq_ignore_ascii_case(&member.email))
        {
            return Err(RepositoryError::Conflict(
                "a team member with this e-mail already exists".to_string(),
            ));
        }
        let now = Utc::now();
        member.id = Some(state.next_id());
        member.created_at = Some(now);
        member.updated_at = Some(now);
        state.members.push(member.clone());
        Ok(member)
    }

    async fn update(&self, id: Id, changes: MemberChanges) -> RepositoryResult<TeamMember> {
        let mut state = self.lock();
        let member = state
            .members
            .iter_mut()
            .find(|m| m.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("TeamMember", id))?;
        changes.apply(member);
        member.updated_at = Some(Utc::now());
        Ok(member.clone())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let mut state = self.lock();
        let before = state.members.len();
        state.members.retain(|m| m.id != Some(id));
        if state.members.len() == before {
            return Err(RepositoryError::not_found("TeamMember", id));
        }
        Ok(())
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<TeamMember>> {
        Ok(self
            .lock()
            .members
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list(
        &self,
        filter: &MemberFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<TeamMember>> {
        let mut members: Vec<TeamMember> = self
            .lock()
            .members
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(paginate(members, page))
    }

    async fn active_with_roles(&self, roles: &[MemberRole]) -> RepositoryResult<Vec<TeamMember>> {
        Ok(self
            .lock()
            .members
            .iter()
            .filter(|m| m.status == MemberStatus::Active && roles.contains(&m.role))
            .cloned()
            .collect())
    }

    async fn upsert_by_email(&self, member: TeamMember) -> RepositoryResult<Upserted<TeamMember>> {
        let mut state = self.lock();
        let now = Utc::now();
        if let Some(existing) = state
            .members
            .iter_mut()
            .find(|m| m.email.eq_ignore_ascii_case(&member.email))
        {
            existing.full_name = member.full_name;
            if member.department_id.is_some() {
                existing.department_id = member.department_id;
            }
            if member.status == MemberStatus::Inactive {
                existing.status = MemberStatus::Inactive;
            }
            if member.hrone_employee_code.is_some() {
                existing.hrone_employee_code = member.hrone_employee_code;
            }
            existing.updated_at = Some(now);
            return Ok(Upserted {
                value: existing.clone(),
                created: false,
            });
        }

        let mut member = member;
        member.id = Some(state.next_id());
        member.created_at = Some(now);
        member.updated_at = Some(now);
        state.members.push(member.clone());
        Ok(Upserted {
            value: member,
            created: true,
        })
    }
}

#[async_trait]
impl Repository<Department, Department, DepartmentChanges> for MemoryStore {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Department>> {
        Ok(self.lock().departments.iter().find(|d| d.id == Some(id)).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Department>> {
        let mut departments = self.lock().departments.clone();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(window(&departments, limit, offset))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.lock().departments.len() as i64)
    }

    async fn create(&self, mut department: Department) -> RepositoryResult<Department> {
        let mut state = self.lock();
        if state.departments.iter().any(|d| d.name == department.name) {
            return Err(RepositoryError::Conflict("department name already in use".to_string()));
        }
        department.id = Some(state.next_id());
        department.created_at = Some(Utc::now());
        state.departments.push(department.clone());
        Ok(department)
    }

    async fn update(&self, id: Id, changes: DepartmentChanges) -> RepositoryResult<Department> {
        let mut state = self.lock();
        if let Some(name) = &changes.name {
            if state.departments.iter().any(|d| &d.name == name && d.id != Some(id)) {
                return Err(RepositoryError::Conflict("department name already in use".to_string()));
            }
        }
        let department = state
            .departments
            .iter_mut()
            .find(|d| d.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("Department", id))?;
        if let Some(name) = changes.name {
            department.name = name;
        }
        if changes.code.is_some() {
            department.code = changes.code;
        }
        Ok(department.clone())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let mut state = self.lock();
        let before = state.departments.len();
        state.departments.retain(|d| d.id != Some(id));
        if state.departments.len() == before {
            return Err(RepositoryError::not_found("Department", id));
        }
        Ok(())
    }
}

#[async_trait]
impl DepartmentStore for MemoryStore {
    async fn list_all(&self) -> RepositoryResult<Vec<Department>> {
        let mut departments = self.lock().departments.clone();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Department>> {
        Ok(self
            .lock()
            .departments
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn upsert_by_hrone_id(&self, department: Department) -> RepositoryResult<Upserted<Department>> {
        let Some(hrone_id) = department.hrone_department_id.clone() else {
            return Err(RepositoryError::Validation(
                "HROne department id is required".to_string(),
            ));
        };

        let mut state = self.lock();
        if state.departments.iter().any(|d| {
            d.name == department.name && d.hrone_department_id.as_deref() != Some(hrone_id.as_str())
        }) {
            return Err(RepositoryError::Conflict("department name already in use".to_string()));
        }

        if let Some(existing) = state
            .departments
            .iter_mut()
            .find(|d| d.hrone_department_id.as_deref() == Some(hrone_id.as_str()))
        {
            existing.name = department.name;
            if department.code.is_some() {
                existing.code = department.code;
            }
            return Ok(Upserted {
                value: existing.clone(),
                created: false,
            });
        }

        let mut department = department;
        department.id = Some(state.next_id());
        department.created_at = Some(Utc::now());
        state.departments.push(department.clone());
        Ok(Upserted {
            value: department,
            created: true,
        })
    }
}

// ============================================================================
// Audits and non-conformances
// ============================================================================

#[async_trait]
impl Repository<Audit, Audit, AuditChanges> for MemoryStore {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<Audit>> {
        Ok(self.lock().audits.iter().find(|a| a.id == Some(id)).cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Audit>> {
        let mut audits = self.lock().audits.clone();
        audits.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date));
        Ok(window(&audits, limit, offset))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.lock().audits.len() as i64)
    }

    async fn create(&self, mut audit: Audit) -> RepositoryResult<Audit> {
        let mut state = self.lock();
        let now = Utc::now();
        audit.id = Some(state.next_id());
        audit.created_at = Some(now);
        audit.updated_at = Some(now);
        state.audits.push(audit.clone());
        Ok(audit)
    }

    async fn update(&self, id: Id, changes: AuditChanges) -> RepositoryResult<Audit> {
        let mut state = self.lock();
        let audit = state
            .audits
            .iter_mut()
            .find(|a| a.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("Audit", id))?;
        if let Some(title) = changes.title {
            audit.title = title;
        }
        if changes.auditor_id.is_some() {
            audit.auditor_id = changes.auditor_id;
        }
        if let Some(date) = changes.scheduled_date {
            audit.scheduled_date = date;
        }
        if let Some(status) = changes.status {
            audit.status = status;
        }
        if changes.findings.is_some() {
            audit.findings = changes.findings;
        }
        audit.updated_at = Some(Utc::now());
        Ok(audit.clone())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let mut state = self.lock();
        let before = state.audits.len();
        state.audits.retain(|a| a.id != Some(id));
        if state.audits.len() == before {
            return Err(RepositoryError::not_found("Audit", id));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn list(&self, filter: &AuditFilter, page: &PaginationParams) -> RepositoryResult<Page<Audit>> {
        let mut audits: Vec<Audit> = self
            .lock()
            .audits
            .iter()
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.department_id.map_or(true, |d| a.department_id == Some(d)))
            .cloned()
            .collect();
        audits.sort_by(|a, b| b.scheduled_date.cmp(&a.scheduled_date));
        Ok(paginate(audits, page))
    }
}

#[async_trait]
impl Repository<NonConformance, NonConformance, NcChanges> for MemoryStore {
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<NonConformance>> {
        Ok(self
            .lock()
            .non_conformances
            .iter()
            .find(|n| n.id == Some(id))
            .cloned())
    }

    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<NonConformance>> {
        let mut ncs = self.lock().non_conformances.clone();
        ncs.reverse();
        Ok(window(&ncs, limit, offset))
    }

    async fn count(&self) -> RepositoryResult<i64> {
        Ok(self.lock().non_conformances.len() as i64)
    }

    async fn create(&self, mut nc: NonConformance) -> RepositoryResult<NonConformance> {
        let mut state = self.lock();
        let now = Utc::now();
        nc.id = Some(state.next_id());
        nc.created_at = Some(now);
        nc.updated_at = Some(now);
        state.non_conformances.push(nc.clone());
        Ok(nc)
    }

    async fn update(&self, id: Id, changes: NcChanges) -> RepositoryResult<NonConformance> {
        let mut state = self.lock();
        let nc = state
            .non_conformances
            .iter_mut()
            .find(|n| n.id == Some(id))
            .ok_or_else(|| RepositoryError::not_found("NonConformance", id))?;
        if let Some(title) = changes.title {
            nc.title = title;
        }
        if changes.description.is_some() {
            nc.description = changes.description;
        }
        if let Some(severity) = changes.severity {
            nc.severity = severity;
        }
        if let Some(status) = changes.status {
            nc.status = status;
        }
        if changes.corrective_action.is_some() {
            nc.corrective_action = changes.corrective_action;
        }
        if changes.assignee_id.is_some() {
            nc.assignee_id = changes.assignee_id;
        }
        if changes.due_date.is_some() {
            nc.due_date = changes.due_date;
        }
        if changes.closed_at.is_some() {
            nc.closed_at = changes.closed_at;
        }
        nc.updated_at = Some(Utc::now());
        Ok(nc.clone())
    }

    async fn delete(&self, id: Id) -> RepositoryResult<()> {
        let mut state = self.lock();
        let before = state.non_conformances.len();
        state.non_conformances.retain(|n| n.id != Some(id));
        if state.non_conformances.len() == before {
            return Err(RepositoryError::not_found("NonConformance", id));
        }
        Ok(())
    }
}

#[async_trait]
impl NonConformanceStore for MemoryStore {
    async fn list(
        &self,
        filter: &NcFilter,
        page: &PaginationParams,
    ) -> RepositoryResult<Page<NonConformance>> {
        let mut ncs: Vec<NonConformance> = self
            .lock()
            .non_conformances
            .iter()
            .filter(|n| filter.status.map_or(true, |s| n.status == s))
            .filter(|n| filter.severity.map_or(true, |s| n.severity == s))
            .filter(|n| filter.department_id.map_or(true, |d| n.department_id == Some(d)))
            .cloned()
            .collect();
        ncs.reverse();
        Ok(paginate(ncs, page))
    }
}

// ============================================================================
// Reporting
// ============================================================================

#[async_trait]
impl ReportStore for MemoryStore {
    async fn dashboard_stats(&self, today: NaiveDate) -> RepositoryResult<DashboardStats> {
        let state = self.lock();
        let since = today - Duration::days(1);
        let work: Vec<&Task> = state.tasks.iter().filter(|t| !t.is_template()).collect();

        let mut stats = DashboardStats::default();
        let mut departments: BTreeMap<String, DepartmentTaskCount> = BTreeMap::new();

        for task in &work {
            *stats.tasks_by_status.entry(task.status.to_string()).or_default() += 1;

            if task.status == TaskStatus::Completed
                && task.completed_at.is_some_and(|at| at.date_naive() >= since)
            {
                stats.completed_last_day += 1;
            }

            let name = task
                .department_id
                .and_then(|id| state.departments.iter().find(|d| d.id == Some(id)))
                .map(|d| d.name.clone())
                .unwrap_or_else(|| UNASSIGNED_DEPARTMENT.to_string());
            let entry = departments.entry(name.clone()).or_insert_with(|| DepartmentTaskCount {
                department: name,
                ..Default::default()
            });
            entry.total += 1;
            if task.status.is_open() {
                entry.open += 1;
            }
            if task.status == TaskStatus::Overdue {
                entry.overdue += 1;
            }
        }

        stats.overdue = stats.tasks_by_status.get("overdue").copied().unwrap_or(0);
        stats.pending_document_approvals = state
            .documents
            .iter()
            .filter(|d| {
                matches!(
                    d.status,
                    HierarchyStatus::PendingChecker | HierarchyStatus::PendingApproval
                )
            })
            .count() as i64;
        stats.open_non_conformances = state
            .non_conformances
            .iter()
            .filter(|n| n.status != NcStatus::Closed)
            .count() as i64;
        stats.departments = departments.into_values().collect();

        Ok(stats)
    }

    async fn table_counts(&self) -> RepositoryResult<Vec<TableCount>> {
        let state = self.lock();
        let rows = |table: &str| -> usize {
            match table {
                "tasks" => state.tasks.len(),
                "documents" => state.documents.len(),
                "document_revisions" => state.revisions.len(),
                "approval_hierarchy" => state.hierarchies.len(),
                "account_approvals" => state.accounts.len(),
                "otp_codes" => state.otp_codes.len(),
                "team_members" => state.members.len(),
                "departments" => state.departments.len(),
                "audits" => state.audits.len(),
                "non_conformances" => state.non_conformances.len(),
                _ => 0,
            }
        };
        Ok(QMS_TABLES
            .iter()
            .map(|table| TableCount {
                table: table.to_string(),
                rows: rows(table) as i64,
            })
            .collect())
    }
}
