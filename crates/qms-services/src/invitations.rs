//! Team member invitations

use qms_auth::CurrentUser;
use qms_contracts::members::TeamMemberContract;
use qms_contracts::Contract;
use qms_core::error::QmsError;
use qms_core::traits::Id;
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{MemberChanges, Stores};
use qms_models::{MemberRole, MemberStatus, TeamMember};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::mailer::Mailer;

/// Body of the `send-invitation` function
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationParams {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default)]
    pub department_id: Option<Id>,
}

#[derive(Clone)]
pub struct InvitationService {
    stores: Stores,
    mailer: Mailer,
}

impl InvitationService {
    pub fn new(stores: Stores, mailer: Mailer) -> Self {
        Self { stores, mailer }
    }

    /// Record an invited member and mail them a sign-up link
    #[instrument(skip(self, user, params), fields(user_id = user.id))]
    pub async fn invite(&self, user: &CurrentUser, params: InvitationParams) -> QmsResult<TeamMember> {
        user.require_manager()?;
        if params.role == MemberRole::Admin {
            user.require_admin()?;
        }

        let invited = TeamMember {
            id: None,
            full_name: params.full_name.trim().to_string(),
            email: params.email.trim().to_lowercase(),
            role: params.role,
            department_id: params.department_id.or(user.department_id),
            status: MemberStatus::Invited,
            hrone_employee_code: None,
            created_at: None,
            updated_at: None,
        };
        TeamMemberContract::new(user).validate(&invited)?;

        let member = match self.stores.members.find_by_email(&invited.email).await? {
            Some(existing) if existing.is_active() => {
                return Err(QmsError::conflict("this person is already an active team member"));
            }
            Some(existing) => {
                let id = existing
                    .id
                    .ok_or_else(|| QmsError::Internal("stored member without id".into()))?;
                let changes = MemberChanges {
                    full_name: Some(invited.full_name.clone()),
                    role: Some(invited.role),
                    department_id: invited.department_id,
                    status: Some(MemberStatus::Invited),
                    hrone_employee_code: None,
                };
                self.stores.members.update(id, changes).await?
            }
            None => self.stores.members.create(invited).await?,
        };

        let message = self
            .mailer
            .templates()
            .invitation(&member.email, &member.full_name, Some(&user.email));
        self.mailer.deliver(&message).await?;
        info!(member_id = ?member.id, "invitation sent");
        Ok(member)
    }
}
