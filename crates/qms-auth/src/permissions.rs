//! Permission system for QMS RS
//!
//! Three roles: admins run the system, managers run the quality work of
//! their departments, users work on what they are given.

use qms_contracts::UserContext;
use qms_core::error::QmsError;
use qms_core::traits::Id;
use qms_models::{MemberRole, TeamMember};

use crate::jwt::{Claims, JwtError};

// ============================================================================
// User Context
// ============================================================================

/// The authenticated team member behind a request
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: Id,
    pub email: String,
    pub role: MemberRole,
    pub department_id: Option<Id>,
}

impl CurrentUser {
    pub fn new(id: Id, email: impl Into<String>, role: MemberRole) -> Self {
        Self {
            id,
            email: email.into(),
            role,
            department_id: None,
        }
    }

    pub fn admin(id: Id, email: impl Into<String>) -> Self {
        Self::new(id, email, MemberRole::Admin)
    }

    pub fn with_department(mut self, department_id: Id) -> Self {
        self.department_id = Some(department_id);
        self
    }

    /// Rebuild the user from validated token claims
    pub fn from_claims(claims: &Claims) -> Result<Self, JwtError> {
        let id = claims
            .sub
            .parse()
            .map_err(|_| JwtError::Invalid("Invalid user ID in token".to_string()))?;
        Ok(Self {
            id,
            email: claims.email.clone(),
            role: claims.role,
            department_id: claims.department_id,
        })
    }

    pub fn from_member(member: &TeamMember) -> Option<Self> {
        Some(Self {
            id: member.id?,
            email: member.email.clone(),
            role: member.role,
            department_id: member.department_id,
        })
    }

    pub fn require_admin(&self) -> Result<(), QmsError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(QmsError::forbidden("administrator role required"))
        }
    }

    pub fn require_manager(&self) -> Result<(), QmsError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(QmsError::forbidden("manager role required"))
        }
    }
}

impl UserContext for CurrentUser {
    fn id(&self) -> Id {
        self.id
    }

    fn role(&self) -> MemberRole {
        self.role
    }

    fn department_id(&self) -> Option<Id> {
        self.department_id
    }
}

// ============================================================================
// Tests
// ============================================================================
