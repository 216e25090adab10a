//! Sign-up requests and their review by administrators

use qms_auth::CurrentUser;
use qms_contracts::members::SignupContract;
use qms_contracts::Contract;
use qms_core::error::QmsError;
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{MemberChanges, Stores};
use qms_models::{AccountApproval, AccountApprovalStatus, MemberRole, MemberStatus, TeamMember};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::mailer::Mailer;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupParams {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub department_id: Option<Id>,
    #[serde(default)]
    pub requested_role: MemberRole,
}

#[derive(Clone)]
pub struct AccountService {
    stores: Stores,
    mailer: Mailer,
}

impl AccountService {
    pub fn new(stores: Stores, mailer: Mailer) -> Self {
        Self { stores, mailer }
    }

    /// Park a sign-up until an administrator reviews it
    #[instrument(skip(self, params), fields(email = %params.email))]
    pub async fn signup(&self, params: SignupParams) -> QmsResult<AccountApproval> {
        let request = AccountApproval {
            id: None,
            email: params.email.trim().to_lowercase(),
            full_name: params.full_name.trim().to_string(),
            department_id: params.department_id,
            requested_role: params.requested_role,
            status: AccountApprovalStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            rejection_reason: None,
            created_at: None,
        };
        SignupContract.validate(&request)?;

        if let Some(member) = self.stores.members.find_by_email(&request.email).await? {
            if member.is_active() {
                return Err(QmsError::conflict("an active account already exists for this e-mail"));
            }
        }

        let request = self.stores.accounts.create_request(request).await?;
        info!(request_id = ?request.id, "sign-up request created");
        Ok(request)
    }

    pub async fn list(
        &self,
        user: &CurrentUser,
        status: Option<AccountApprovalStatus>,
        page: &PaginationParams,
    ) -> QmsResult<Page<AccountApproval>> {
        user.require_admin()?;
        Ok(self.stores.accounts.list_requests(status, page).await?)
    }

    async fn load(&self, id: Id) -> QmsResult<AccountApproval> {
        self.stores
            .accounts
            .find_request(id)
            .await?
            .ok_or_else(|| QmsError::not_found("AccountApproval", id))
    }

    /// Approve a request and activate (or create) the matching team member
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn approve(&self, user: &CurrentUser, id: Id) -> QmsResult<TeamMember> {
        user.require_admin()?;
        let request = self.load(id).await?;
        if !request.is_pending() {
            return Err(QmsError::invalid_transition("request has already been decided"));
        }

        // The member is written first so a failed write leaves the request pending
        let member = match self.stores.members.find_by_email(&request.email).await? {
            Some(existing) => {
                let member_id = existing
                    .id
                    .ok_or_else(|| QmsError::Internal("stored member without id".into()))?;
                let changes = MemberChanges {
                    full_name: Some(request.full_name.clone()),
                    role: Some(request.requested_role),
                    department_id: request.department_id,
                    status: Some(MemberStatus::Active),
                    hrone_employee_code: None,
                };
                self.stores.members.update(member_id, changes).await?
            }
            None => {
                self.stores
                    .members
                    .create(TeamMember {
                        id: None,
                        full_name: request.full_name.clone(),
                        email: request.email.clone(),
                        role: request.requested_role,
                        department_id: request.department_id,
                        status: MemberStatus::Active,
                        hrone_employee_code: None,
                        created_at: None,
                        updated_at: None,
                    })
                    .await?
            }
        };
        self.stores
            .accounts
            .decide(id, AccountApprovalStatus::Approved, Some(user.id), None)
            .await?;
        info!(request_id = id, member_id = ?member.id, "sign-up approved");

        let message = self
            .mailer
            .templates()
            .account_approved(&member.email, &member.full_name);
        self.mailer.notify(&message).await;
        Ok(member)
    }

    #[instrument(skip(self, user, reason), fields(user_id = user.id))]
    pub async fn reject(&self, user: &CurrentUser, id: Id, reason: Option<String>) -> QmsResult<AccountApproval> {
        user.require_admin()?;
        let reason = reason.filter(|r| !r.trim().is_empty());
        let request = self
            .stores
            .accounts
            .decide(id, AccountApprovalStatus::Rejected, Some(user.id), reason)
            .await?;
        info!(request_id = id, "sign-up rejected");

        let message = self.mailer.templates().account_rejected(
            &request.email,
            &request.full_name,
            request.rejection_reason.as_deref(),
        );
        self.mailer.notify(&message).await;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, manager, member, Harness};
    use async_trait::async_trait;
    use qms_db::{MemberFilter, MemberStore, MemoryStore, RepositoryError, RepositoryResult, Upserted};
    use std::sync::Arc;

    fn params(email: &str) -> SignupParams {
        SignupParams {
            email: email.into(),
            full_name: "Ravi Iyer".into(),
            department_id: Some(3),
            requested_role: MemberRole::User,
        }
    }

    #[tokio::test]
    async fn test_duplicate_pending_signup_is_refused() {
        let h = Harness::new();
        let service = h.services().accounts;

        let request = service.signup(params(" Ravi@Example.com ")).await.unwrap();
        assert_eq!(request.email, "ravi@example.com");

        let err = service.signup(params("ravi@example.com")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_signup_refuses_admin_role() {
        let h = Harness::new();
        let mut p = params("ravi@example.com");
        p.requested_role = MemberRole::Admin;
        let err = h.services().accounts.signup(p).await.unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[tokio::test]
    async fn test_approval_activates_invited_member() {
        let h = Harness::new();
        h.stores
            .members
            .create(member("ravi@example.com", MemberRole::User, MemberStatus::Invited))
            .await
            .unwrap();
        let service = h.services().accounts;
        let request = service.signup(params("ravi@example.com")).await.unwrap();

        let err = service.approve(&manager(), request.id.unwrap()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let approved = service.approve(&admin(), request.id.unwrap()).await.unwrap();
        assert_eq!(approved.status, MemberStatus::Active);
        assert_eq!(approved.department_id, Some(3));
        assert_eq!(h.outbox.sent_to("ravi@example.com").len(), 1);

        let err = service.approve(&admin(), request.id.unwrap()).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    /// Member store whose writes always fail
    struct ReadOnlyMembers(MemoryStore);

    #[async_trait]
    impl Repository<TeamMember, TeamMember, MemberChanges> for ReadOnlyMembers {
        async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<TeamMember>> {
            Repository::<TeamMember, TeamMember, MemberChanges>::find_by_id(&self.0, id).await
        }

        async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<TeamMember>> {
            Repository::<TeamMember, TeamMember, MemberChanges>::find_all(&self.0, limit, offset).await
        }

        async fn count(&self) -> RepositoryResult<i64> {
            Repository::<TeamMember, TeamMember, MemberChanges>::count(&self.0).await
        }

        async fn create(&self, _member: TeamMember) -> RepositoryResult<TeamMember> {
            Err(RepositoryError::Validation("members are read-only".into()))
        }

        async fn update(&self, _id: Id, _changes: MemberChanges) -> RepositoryResult<TeamMember> {
            Err(RepositoryError::Validation("members are read-only".into()))
        }

        async fn delete(&self, _id: Id) -> RepositoryResult<()> {
            Err(RepositoryError::Validation("members are read-only".into()))
        }
    }

    #[async_trait]
    impl MemberStore for ReadOnlyMembers {
        async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<TeamMember>> {
            MemberStore::find_by_email(&self.0, email).await
        }

        async fn list(&self, filter: &MemberFilter, page: &PaginationParams) -> RepositoryResult<Page<TeamMember>> {
            MemberStore::list(&self.0, filter, page).await
        }

        async fn active_with_roles(&self, roles: &[MemberRole]) -> RepositoryResult<Vec<TeamMember>> {
            self.0.active_with_roles(roles).await
        }

        async fn upsert_by_email(&self, _member: TeamMember) -> RepositoryResult<Upserted<TeamMember>> {
            Err(RepositoryError::Validation("members are read-only".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_member_write_leaves_request_pending() {
        let mut h = Harness::new();
        let request = h.services().accounts.signup(params("ravi@example.com")).await.unwrap();
        h.stores.members = Arc::new(ReadOnlyMembers(h.memory.clone()));
        let service = h.services().accounts;

        assert!(service.approve(&admin(), request.id.unwrap()).await.is_err());

        let stored = h.stores.accounts.find_request(request.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.status, AccountApprovalStatus::Pending);
        assert!(stored.reviewed_by.is_none());
        assert!(h.outbox.sent_to("ravi@example.com").is_empty());
    }

    #[tokio::test]
    async fn test_rejection_mails_reason() {
        let h = Harness::new();
        let service = h.services().accounts;
        let request = service.signup(params("ravi@example.com")).await.unwrap();

        let rejected = service
            .reject(&admin(), request.id.unwrap(), Some("Unknown department".into()))
            .await
            .unwrap();
        assert_eq!(rejected.status, AccountApprovalStatus::Rejected);

        let sent = h.outbox.sent_to("ravi@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text_body.contains("Unknown department"));

        // A rejected e-mail may sign up again
        assert!(service.signup(params("ravi@example.com")).await.is_ok());
    }
}
