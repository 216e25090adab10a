//! Audit and non-conformance contracts

use qms_core::error::ValidationErrors;
use qms_models::{Audit, NcStatus, NonConformance};

use crate::base::{validate_required, Contract, UserContext, ValidationResult};

pub struct AuditContract<'a, U: UserContext> {
    user: &'a U,
}

impl<'a, U: UserContext> AuditContract<'a, U> {
    pub fn new(user: &'a U) -> Self {
        Self { user }
    }

    pub fn can_manage(&self) -> bool {
        self.user.is_manager()
    }

    /// Auditors record findings on their own audits
    pub fn can_record_findings(&self, audit: &Audit) -> bool {
        self.user.is_manager() || audit.auditor_id == Some(self.user.id())
    }
}

impl<'a, U: UserContext> Contract<Audit> for AuditContract<'a, U> {
    fn validate(&self, audit: &Audit) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        validate_required("title", &audit.title, 255, &mut errors);
        errors.into_result()
    }
}

pub struct NonConformanceContract<'a, U: UserContext> {
    user: &'a U,
}

impl<'a, U: UserContext> NonConformanceContract<'a, U> {
    pub fn new(user: &'a U) -> Self {
        Self { user }
    }

    pub fn can_edit(&self, nc: &NonConformance) -> bool {
        self.user.is_manager() || nc.assignee_id == Some(self.user.id())
    }

    /// Closing needs a manager
    pub fn can_close(&self) -> bool {
        self.user.is_manager()
    }
}

impl<'a, U: UserContext> Contract<NonConformance> for NonConformanceContract<'a, U> {
    fn validate(&self, nc: &NonConformance) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        validate_required("title", &nc.title, 255, &mut errors);

        if nc.status == NcStatus::Closed
            && nc.corrective_action.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            errors.add("corrective_action", "is required to close a non-conformance");
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::test_support::MockUser;
    use qms_models::Severity;

    fn nc() -> NonConformance {
        NonConformance {
            id: Some(3),
            title: "Uncalibrated torque wrench".into(),
            description: None,
            audit_id: None,
            department_id: Some(1),
            severity: Severity::Major,
            status: NcStatus::Open,
            corrective_action: None,
            assignee_id: Some(7),
            due_date: None,
            closed_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_closing_requires_corrective_action() {
        let user = MockUser::manager();
        let contract = NonConformanceContract::new(&user);

        let mut closed = nc();
        closed.status = NcStatus::Closed;
        assert!(contract.validate(&closed).unwrap_err().has_error("corrective_action"));

        closed.corrective_action = Some("Wrench replaced and calibration schedule added".into());
        assert!(contract.validate(&closed).is_ok());
    }

    #[test]
    fn test_assignee_can_edit_but_not_close() {
        let user = MockUser::user(7);
        let contract = NonConformanceContract::new(&user);
        assert!(contract.can_edit(&nc()));
        assert!(!contract.can_close());
    }
}
