//! First administrator bootstrap for the `create-admin` function

use qms_auth::codes_match;
use qms_contracts::{validate_email, validate_required};
use qms_core::config::AppConfig;
use qms_core::error::{QmsError, ValidationErrors};
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{MemberChanges, Stores};
use qms_models::{AccountApproval, AccountApprovalStatus, MemberRole, MemberStatus, TeamMember};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminParams {
    pub email: String,
    pub full_name: String,
}

#[derive(Clone)]
pub struct AdminBootstrapService {
    stores: Stores,
    config: Arc<AppConfig>,
}

impl AdminBootstrapService {
    pub fn new(stores: Stores, config: Arc<AppConfig>) -> Self {
        Self { stores, config }
    }

    /// Create or promote an active administrator. Requires the configured setup token.
    #[instrument(skip(self, token, params), fields(email = %params.email))]
    pub async fn create_admin(&self, token: Option<&str>, params: CreateAdminParams) -> QmsResult<TeamMember> {
        let Some(expected) = self.config.auth.setup_token.as_deref() else {
            return Err(QmsError::forbidden("admin bootstrap is disabled"));
        };
        if !token.is_some_and(|t| codes_match(expected, t)) {
            warn!("create-admin called with a bad setup token");
            return Err(QmsError::unauthorized("invalid setup token"));
        }

        let email = params.email.trim().to_lowercase();
        let full_name = params.full_name.trim().to_string();
        let mut errors = ValidationErrors::new();
        validate_email("email", &email, &mut errors);
        validate_required("full_name", &full_name, 255, &mut errors);
        errors.into_result()?;

        let upserted = self
            .stores
            .members
            .upsert_by_email(TeamMember {
                id: None,
                full_name: full_name.clone(),
                email: email.clone(),
                role: MemberRole::Admin,
                department_id: None,
                status: MemberStatus::Active,
                hrone_employee_code: None,
                created_at: None,
                updated_at: None,
            })
            .await?;
        let member_id = upserted
            .value
            .id
            .ok_or_else(|| QmsError::Internal("stored member without id".into()))?;
        let member = if upserted.created {
            upserted.value
        } else {
            let changes = MemberChanges {
                role: Some(MemberRole::Admin),
                status: Some(MemberStatus::Active),
                ..Default::default()
            };
            self.stores.members.update(member_id, changes).await?
        };

        match self.stores.accounts.find_pending_by_email(&email).await? {
            Some(pending) => {
                let id = pending
                    .id
                    .ok_or_else(|| QmsError::Internal("stored request without id".into()))?;
                self.stores
                    .accounts
                    .decide(id, AccountApprovalStatus::Approved, Some(member_id), None)
                    .await?;
            }
            None => {
                let request = self
                    .stores
                    .accounts
                    .create_request(AccountApproval {
                        id: None,
                        email: email.clone(),
                        full_name,
                        department_id: None,
                        requested_role: MemberRole::Admin,
                        status: AccountApprovalStatus::Pending,
                        reviewed_by: None,
                        reviewed_at: None,
                        rejection_reason: None,
                        created_at: None,
                    })
                    .await?;
                if let Some(id) = request.id {
                    self.stores
                        .accounts
                        .decide(id, AccountApprovalStatus::Approved, Some(member_id), None)
                        .await?;
                }
            }
        }

        info!(member_id, "administrator bootstrapped");
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use qms_core::pagination::PaginationParams;

    fn harness() -> Harness {
        let mut config = AppConfig::default();
        config.auth.setup_token = Some("bootstrap-secret".into());
        Harness::with_config(config)
    }

    fn params() -> CreateAdminParams {
        CreateAdminParams {
            email: "Owner@Example.com".into(),
            full_name: "Plant Owner".into(),
        }
    }

    #[tokio::test]
    async fn test_disabled_without_setup_token() {
        let h = Harness::new();
        let err = h
            .services()
            .admin
            .create_admin(Some("anything"), params())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_wrong_token() {
        let h = harness();
        let service = h.services().admin;
        assert_eq!(service.create_admin(None, params()).await.unwrap_err().status_code(), 401);
        assert_eq!(
            service.create_admin(Some("guess"), params()).await.unwrap_err().status_code(),
            401
        );
    }

    #[tokio::test]
    async fn test_bootstrap_creates_admin_and_approval() {
        let h = harness();
        let admin = h
            .services()
            .admin
            .create_admin(Some("bootstrap-secret"), params())
            .await
            .unwrap();
        assert_eq!(admin.email, "owner@example.com");
        assert_eq!(admin.role, MemberRole::Admin);
        assert_eq!(admin.status, MemberStatus::Active);

        let approvals = h
            .stores
            .accounts
            .list_requests(Some(AccountApprovalStatus::Approved), &PaginationParams::default())
            .await
            .unwrap();
        assert_eq!(approvals.total, 1);
    }

    #[tokio::test]
    async fn test_bootstrap_promotes_existing_member() {
        let h = harness();
        let existing = h.add_member("owner@example.com", MemberRole::User).await;

        let admin = h
            .services()
            .admin
            .create_admin(Some("bootstrap-secret"), params())
            .await
            .unwrap();
        assert_eq!(admin.id, existing.id);
        assert_eq!(admin.role, MemberRole::Admin);
    }
}
