//! Task lifecycle: create, read, update, delete, status changes and approval

use qms_contracts::tasks::TaskContract;
use qms_contracts::{Contract, UserContext};
use qms_core::error::QmsError;
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{Generated, Stores, TaskChanges, TaskDecision, TaskFilter};
use qms_models::{Task, TaskApprovalStatus, TaskStatus};
use serde::Serialize;
use tracing::{info, instrument};

use super::TaskParams;
use crate::mailer::Mailer;

/// A created task; recurring series also return their first instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreated {
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_instance: Option<Task>,
}

/// Outcome of a status change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub task: Task,
    /// Set when completing a recurring instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<Generated>,
}

#[derive(Clone)]
pub struct TaskService {
    stores: Stores,
    mailer: Mailer,
}

impl TaskService {
    pub fn new(stores: Stores, mailer: Mailer) -> Self {
        Self { stores, mailer }
    }

    async fn load(&self, id: Id) -> QmsResult<Task> {
        self.stores
            .tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| QmsError::not_found("Task", id))
    }

    #[instrument(skip(self, user, params), fields(user_id = user.id()))]
    pub async fn create<U: UserContext>(&self, user: &U, params: TaskParams) -> QmsResult<TaskCreated> {
        let task = params.into_task(user.id());
        let contract = TaskContract::new(user);
        if !contract.can_create(&task) {
            return Err(QmsError::forbidden("you can only create tasks assigned to yourself"));
        }
        contract.validate(&task)?;

        if task.is_recurring {
            let (template, first) = self.stores.tasks.create_series(task).await?;
            info!(task_id = ?template.id, frequency = ?template.frequency, "recurring series created");
            return Ok(TaskCreated {
                task: template,
                first_instance: Some(first),
            });
        }

        let task = self.stores.tasks.create(task).await?;
        info!(task_id = ?task.id, "task created");
        Ok(TaskCreated {
            task,
            first_instance: None,
        })
    }

    pub async fn get(&self, id: Id) -> QmsResult<Task> {
        self.load(id).await
    }

    pub async fn list(&self, filter: &TaskFilter, page: &PaginationParams) -> QmsResult<Page<Task>> {
        Ok(self.stores.tasks.list(filter, page).await?)
    }

    /// Generated instances of a series, oldest first
    pub async fn instances(&self, root_id: Id) -> QmsResult<Vec<Task>> {
        let root = self.load(root_id).await?;
        if !root.is_template() {
            return Err(QmsError::invalid("task", "is not a recurring series"));
        }
        Ok(self.stores.tasks.instances(root_id).await?)
    }

    #[instrument(skip(self, user, changes), fields(user_id = user.id()))]
    pub async fn update<U: UserContext>(&self, user: &U, id: Id, changes: TaskChanges) -> QmsResult<Task> {
        let current = self.load(id).await?;
        let contract = TaskContract::new(user);
        if !contract.can_edit(&current) {
            return Err(QmsError::forbidden("you cannot edit this task"));
        }

        let mut updated = current.clone();
        changes.apply(&mut updated);
        if updated.assignee_id != current.assignee_id && !contract.can_create(&updated) {
            return Err(QmsError::forbidden("you can only assign tasks to yourself"));
        }
        contract.validate(&updated)?;

        Ok(self.stores.tasks.update(id, changes).await?)
    }

    #[instrument(skip(self, user), fields(user_id = user.id()))]
    pub async fn delete<U: UserContext>(&self, user: &U, id: Id) -> QmsResult<()> {
        let task = self.load(id).await?;
        if !TaskContract::new(user).can_delete(&task) {
            return Err(QmsError::forbidden("you cannot delete this task"));
        }
        self.stores.tasks.delete(id).await?;
        info!(task_id = id, "task deleted");
        Ok(())
    }

    /// Change a task's status. Completion runs the recurrence rule in the
    /// same transaction; a completed task only reopens through rejection.
    #[instrument(skip(self, user), fields(user_id = user.id()))]
    pub async fn set_status<U: UserContext>(&self, user: &U, id: Id, status: TaskStatus) -> QmsResult<StatusChange> {
        let current = self.load(id).await?;
        if !TaskContract::new(user).can_edit(&current) {
            return Err(QmsError::forbidden("you cannot change this task"));
        }
        if current.is_template() {
            return Err(QmsError::invalid_transition(
                "series templates have no status of their own",
            ));
        }
        if current.status == TaskStatus::Completed {
            return Err(QmsError::invalid_transition(
                "completed tasks only reopen through approval rejection",
            ));
        }

        match status {
            TaskStatus::Completed => {
                let completion = self.stores.tasks.complete_and_generate_next(id, user.id()).await?;
                info!(
                    task_id = id,
                    next_created = completion.next.created().is_some(),
                    "task completed"
                );
                if completion.task.approval_status == Some(TaskApprovalStatus::Pending) {
                    self.notify_approver(&completion.task).await;
                }
                Ok(StatusChange {
                    next: completion.task.is_instance().then_some(completion.next),
                    task: completion.task,
                })
            }
            TaskStatus::Overdue => Err(QmsError::invalid(
                "status",
                "overdue is assigned by the automation job",
            )),
            _ => {
                let task = self.stores.tasks.update_status(id, status).await?;
                Ok(StatusChange { task, next: None })
            }
        }
    }

    #[instrument(skip(self, user, reason), fields(user_id = user.id()))]
    pub async fn approve<U: UserContext>(&self, user: &U, id: Id, reason: Option<String>) -> QmsResult<Task> {
        self.decide(user, id, TaskApprovalStatus::Approved, reason).await
    }

    #[instrument(skip(self, user, reason), fields(user_id = user.id()))]
    pub async fn reject<U: UserContext>(&self, user: &U, id: Id, reason: String) -> QmsResult<Task> {
        if reason.trim().is_empty() {
            return Err(QmsError::invalid("reason", "can't be blank"));
        }
        self.decide(user, id, TaskApprovalStatus::Rejected, Some(reason)).await
    }

    async fn decide<U: UserContext>(
        &self,
        user: &U,
        id: Id,
        status: TaskApprovalStatus,
        reason: Option<String>,
    ) -> QmsResult<Task> {
        let task = self.load(id).await?;
        let contract = TaskContract::new(user);
        if !contract.can_decide_approval(&task) {
            return Err(QmsError::forbidden("only the designated approver can decide"));
        }
        if task.approval_status != Some(TaskApprovalStatus::Pending) {
            return Err(QmsError::invalid_transition("task has no pending approval"));
        }

        let mut decided = task.clone();
        decided.approval_reason = reason.clone();
        contract.validate(&decided)?;

        let task = self
            .stores
            .tasks
            .record_decision(id, TaskDecision { status, reason })
            .await?;
        info!(task_id = id, decision = %status, "task approval decided");

        if let Some(assignee) = task.assignee_id.or(task.created_by) {
            if let Some(member) = self.stores.members.find_by_id(assignee).await? {
                let message = self.mailer.templates().task_decided(&member.email, &task);
                self.mailer.notify(&message).await;
            }
        }
        Ok(task)
    }

    async fn notify_approver(&self, task: &Task) {
        let Some(approver_id) = task.approver_id else {
            return;
        };
        match self.stores.members.find_by_id(approver_id).await {
            Ok(Some(approver)) => {
                let message = self.mailer.templates().task_approval_requested(&approver.email, task);
                self.mailer.notify(&message).await;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, approver_id, "approver lookup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, manager, user, Harness};
    use qms_models::{Frequency, MemberRole};

    fn params(title: &str) -> TaskParams {
        TaskParams {
            title: title.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_users_only_assign_themselves() {
        let h = Harness::new();
        let service = h.services().tasks;

        let mut foreign = params("Clean line 3");
        foreign.assignee_id = Some(44);
        let err = service.create(&user(9), foreign).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let mut own = params("Clean line 3");
        own.assignee_id = Some(9);
        assert!(service.create(&user(9), own).await.is_ok());
    }

    #[tokio::test]
    async fn test_recurring_task_needs_frequency() {
        let h = Harness::new();
        let mut recurring = params("Weekly 5S walk");
        recurring.is_recurring = true;
        recurring.start_date = Some(crate::test_support::date(2026, 3, 2));

        let err = h.services().tasks.create(&manager(), recurring).await.unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn test_completing_an_instance_creates_the_next() {
        let h = Harness::new();
        let service = h.services().tasks;

        let mut recurring = params("Monthly fire drill");
        recurring.is_recurring = true;
        recurring.frequency = Some(Frequency::Monthly);
        recurring.due_date = Some(crate::test_support::date(2026, 1, 31));
        let created = service.create(&manager(), recurring).await.unwrap();
        let first = created.first_instance.unwrap();

        let change = service
            .set_status(&manager(), first.id.unwrap(), TaskStatus::Completed)
            .await
            .unwrap();
        let next = change.next.as_ref().and_then(Generated::created).unwrap();
        assert_eq!(next.due_date, Some(crate::test_support::date(2026, 2, 28)));

        let err = service
            .set_status(&manager(), first.id.unwrap(), TaskStatus::InProgress)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);

        let instances = service.instances(created.task.id.unwrap()).await.unwrap();
        assert_eq!(instances.len(), 2);
    }

    #[tokio::test]
    async fn test_approval_flow_notifies_and_reopens_on_rejection() {
        let h = Harness::new();
        let approver = h.add_member("approver@example.com", MemberRole::Manager).await;
        let assignee = h.add_member("assignee@example.com", MemberRole::User).await;
        let service = h.services().tasks;

        let mut p = params("Review deviation report");
        p.assignee_id = assignee.id;
        p.approver_id = approver.id;
        let task = service.create(&manager(), p).await.unwrap().task;
        let id = task.id.unwrap();

        let completed = service.set_status(&manager(), id, TaskStatus::Completed).await.unwrap();
        assert_eq!(completed.task.approval_status, Some(TaskApprovalStatus::Pending));
        assert!(completed.next.is_none());
        assert_eq!(h.outbox.sent_to("approver@example.com").len(), 1);

        let err = service.reject(&user(99), id, "nope".into()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let rejected = service.reject(&admin(), id, "Attach the evidence".into()).await.unwrap();
        assert_eq!(rejected.status, TaskStatus::InProgress);
        assert_eq!(rejected.approval_status, Some(TaskApprovalStatus::Rejected));
        assert_eq!(h.outbox.sent_to("assignee@example.com").len(), 1);

        let err = service.approve(&admin(), id, None).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_recompleting_rejected_instance_keeps_one_per_period() {
        let h = Harness::new();
        let approver = h.add_member("approver@example.com", MemberRole::Manager).await;
        let service = h.services().tasks;

        let mut recurring = params("Monthly fire drill");
        recurring.is_recurring = true;
        recurring.frequency = Some(Frequency::Monthly);
        recurring.due_date = Some(crate::test_support::date(2026, 1, 31));
        recurring.approver_id = approver.id;
        let created = service.create(&manager(), recurring).await.unwrap();
        let root_id = created.task.id.unwrap();
        let first_id = created.first_instance.unwrap().id.unwrap();

        let change = service
            .set_status(&manager(), first_id, TaskStatus::Completed)
            .await
            .unwrap();
        let second = change.next.as_ref().and_then(Generated::created).cloned().unwrap();
        service
            .set_status(&manager(), second.id.unwrap(), TaskStatus::InProgress)
            .await
            .unwrap();

        service.reject(&admin(), first_id, "Missing sign-off".into()).await.unwrap();
        let again = service
            .set_status(&manager(), first_id, TaskStatus::Completed)
            .await
            .unwrap();
        assert!(again.next.as_ref().and_then(Generated::created).is_none());

        let instances = service.instances(root_id).await.unwrap();
        assert_eq!(instances.len(), 2);
        let feb = instances
            .iter()
            .filter(|t| t.due_date == Some(crate::test_support::date(2026, 2, 28)))
            .count();
        assert_eq!(feb, 1);
    }

    #[tokio::test]
    async fn test_overdue_cannot_be_set_by_hand() {
        let h = Harness::new();
        let service = h.services().tasks;
        let task = service.create(&manager(), params("Calibrate scale")).await.unwrap().task;

        let err = service
            .set_status(&manager(), task.id.unwrap(), TaskStatus::Overdue)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);
    }
}
