//! Team members and departments

use qms_auth::CurrentUser;
use qms_contracts::members::{DepartmentContract, TeamMemberContract};
use qms_contracts::Contract;
use qms_core::error::QmsError;
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{DepartmentChanges, MemberChanges, MemberFilter, Stores};
use qms_models::{Department, MemberRole, MemberStatus, TeamMember};
use serde::Deserialize;
use tracing::{info, instrument};

/// Editable member attributes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<MemberRole>,
    #[serde(default)]
    pub department_id: Option<Id>,
    #[serde(default)]
    pub status: Option<MemberStatus>,
}

impl From<MemberUpdate> for MemberChanges {
    fn from(update: MemberUpdate) -> Self {
        MemberChanges {
            full_name: update.full_name.map(|n| n.trim().to_string()),
            role: update.role,
            department_id: update.department_id,
            status: update.status,
            hrone_employee_code: None,
        }
    }
}

#[derive(Clone)]
pub struct TeamMemberService {
    stores: Stores,
}

impl TeamMemberService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn list(&self, filter: &MemberFilter, page: &PaginationParams) -> QmsResult<Page<TeamMember>> {
        Ok(self.stores.members.list(filter, page).await?)
    }

    pub async fn get(&self, id: Id) -> QmsResult<TeamMember> {
        self.stores
            .members
            .find_by_id(id)
            .await?
            .ok_or_else(|| QmsError::not_found("TeamMember", id))
    }

    #[instrument(skip(self, user, update), fields(user_id = user.id))]
    pub async fn update(&self, user: &CurrentUser, id: Id, update: MemberUpdate) -> QmsResult<TeamMember> {
        let before = self.get(id).await?;
        let contract = TeamMemberContract::new(user);
        if !contract.can_edit(&before) {
            return Err(QmsError::forbidden("you cannot edit this team member"));
        }

        let changes = MemberChanges::from(update);
        let mut after = before.clone();
        changes.apply(&mut after);
        contract.validate_update(&before, &after)?;

        let member = self.stores.members.update(id, changes).await?;
        info!(member_id = id, role = %member.role, status = %member.status, "team member updated");
        Ok(member)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentParams {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Clone)]
pub struct DepartmentService {
    stores: Stores,
}

impl DepartmentService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn list(&self) -> QmsResult<Vec<Department>> {
        Ok(self.stores.departments.list_all().await?)
    }

    #[instrument(skip(self, user, params), fields(user_id = user.id))]
    pub async fn create(&self, user: &CurrentUser, params: DepartmentParams) -> QmsResult<Department> {
        user.require_admin()?;
        let department = Department {
            id: None,
            name: params.name.trim().to_string(),
            code: params.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            hrone_department_id: None,
            created_at: None,
        };
        DepartmentContract.validate(&department)?;

        let department = self.stores.departments.create(department).await?;
        info!(department_id = ?department.id, "department created");
        Ok(department)
    }

    #[instrument(skip(self, user, params), fields(user_id = user.id))]
    pub async fn update(&self, user: &CurrentUser, id: Id, params: DepartmentParams) -> QmsResult<Department> {
        user.require_admin()?;
        let mut department = self
            .stores
            .departments
            .find_by_id(id)
            .await?
            .ok_or_else(|| QmsError::not_found("Department", id))?;
        let changes = DepartmentChanges {
            name: Some(params.name.trim().to_string()),
            code: params.code.map(|c| c.trim().to_string()),
        };
        department.name = changes.name.clone().unwrap_or_default();
        if changes.code.is_some() {
            department.code = changes.code.clone();
        }
        DepartmentContract.validate(&department)?;

        Ok(self.stores.departments.update(id, changes).await?)
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn delete(&self, user: &CurrentUser, id: Id) -> QmsResult<()> {
        user.require_admin()?;
        self.stores.departments.delete(id).await?;
        info!(department_id = id, "department deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, manager, Harness};

    #[tokio::test]
    async fn test_member_cannot_change_own_role() {
        let h = Harness::new();
        let member = h.add_member("op@example.com", MemberRole::User).await;
        let me = CurrentUser::from_member(&member).unwrap();
        let service = h.services().members;

        let renamed = service
            .update(
                &me,
                me.id,
                MemberUpdate {
                    full_name: Some("Operator One".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.full_name, "Operator One");

        let err = service
            .update(
                &me,
                me.id,
                MemberUpdate {
                    role: Some(MemberRole::Manager),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);

        let promoted = service
            .update(
                &admin(),
                me.id,
                MemberUpdate {
                    role: Some(MemberRole::Manager),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(promoted.role, MemberRole::Manager);
    }

    #[tokio::test]
    async fn test_departments_are_admin_managed() {
        let h = Harness::new();
        let service = h.services().departments;
        let params = DepartmentParams {
            name: "Production".into(),
            code: Some("PRD".into()),
        };

        let err = service.create(&manager(), params.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let department = service.create(&admin(), params.clone()).await.unwrap();
        let err = service.create(&admin(), params).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        let renamed = service
            .update(
                &admin(),
                department.id.unwrap(),
                DepartmentParams {
                    name: "Production & Packing".into(),
                    code: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.code.as_deref(), Some("PRD"));

        service.delete(&admin(), department.id.unwrap()).await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
    }
}
