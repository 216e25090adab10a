//! Team member and account request contracts

use qms_core::error::ValidationErrors;
use qms_models::{AccountApproval, Department, MemberRole, TeamMember};

use crate::base::{
    validate_attributes, validate_email, validate_required, Contract, UserContext, ValidationResult,
};

pub struct TeamMemberContract<'a, U: UserContext> {
    user: &'a U,
}

impl<'a, U: UserContext> TeamMemberContract<'a, U> {
    pub fn new(user: &'a U) -> Self {
        Self { user }
    }

    /// Only admins manage membership
    pub fn can_manage(&self) -> bool {
        self.user.is_admin()
    }

    /// Members may edit their own profile, but not their own role or status
    pub fn can_edit(&self, member: &TeamMember) -> bool {
        self.user.is_admin() || member.id == Some(self.user.id())
    }

    pub fn validate_update(&self, before: &TeamMember, after: &TeamMember) -> ValidationResult {
        let mut errors = match self.validate(after) {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if !self.user.is_admin() {
            if before.role != after.role {
                errors.add("role", "can only be changed by an administrator");
            }
            if before.status != after.status {
                errors.add("status", "can only be changed by an administrator");
            }
        }
        if before.id == Some(self.user.id()) && after.role != MemberRole::Admin && before.role == MemberRole::Admin {
            errors.add_base("administrators cannot remove their own admin role");
        }
        errors.into_result()
    }
}

impl<'a, U: UserContext> Contract<TeamMember> for TeamMemberContract<'a, U> {
    fn validate(&self, member: &TeamMember) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        validate_required("full_name", &member.full_name, 255, &mut errors);
        validate_email("email", &member.email, &mut errors);
        validate_attributes(member, &mut errors);
        errors.into_result()
    }
}

/// Validation for self-service sign-up requests
pub struct SignupContract;

impl Contract<AccountApproval> for SignupContract {
    fn validate(&self, request: &AccountApproval) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        validate_required("full_name", &request.full_name, 255, &mut errors);
        validate_email("email", &request.email, &mut errors);
        if request.requested_role == MemberRole::Admin {
            errors.add("requested_role", "cannot be requested at sign-up");
        }
        errors.into_result()
    }
}

pub struct DepartmentContract;

impl Contract<Department> for DepartmentContract {
    fn validate(&self, department: &Department) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        validate_required("name", &department.name, 255, &mut errors);
        validate_attributes(department, &mut errors);
        errors.into_result()
    }
}
