//! Document contracts

use qms_core::error::ValidationErrors;
use qms_models::{ApprovalHierarchy, Document};
use regex::Regex;
use std::sync::OnceLock;

use crate::base::{validate_required, Contract, UserContext, ValidationResult};

fn document_number_regex() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| Regex::new(r"^[A-Z0-9][A-Z0-9\-/.]{1,49}$").expect("valid document number regex"))
}

pub struct DocumentContract<'a, U: UserContext> {
    user: &'a U,
}

impl<'a, U: UserContext> DocumentContract<'a, U> {
    pub fn new(user: &'a U) -> Self {
        Self { user }
    }

    pub fn can_manage(&self, document: &Document) -> bool {
        self.user.is_manager() || document.owner_id == self.user.id()
    }

    /// Checker and approver must be named, and the checker cannot check their own work
    pub fn validate_hierarchy(&self, hierarchy: &ApprovalHierarchy) -> ValidationResult {
        let mut errors = ValidationErrors::new();
        if hierarchy.checker_id == hierarchy.initiator_id {
            errors.add("checker_id", "must differ from the initiator");
        }
        if hierarchy.approver_id == hierarchy.checker_id {
            errors.add("approver_id", "must differ from the checker");
        }
        errors.into_result()
    }
}

impl<'a, U: UserContext> Contract<Document> for DocumentContract<'a, U> {
    fn validate(&self, document: &Document) -> ValidationResult {
        let mut errors = ValidationErrors::new();

        validate_required("title", &document.title, 255, &mut errors);
        if document.document_number.trim().is_empty() {
            errors.add("document_number", "can't be blank");
        } else if !document_number_regex().is_match(&document.document_number) {
            errors.add(
                "document_number",
                "must use upper-case letters, digits, '-', '/' or '.'",
            );
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::test_support::MockUser;

    #[test]
    fn test_document_number_format() {
        let user = MockUser::manager();
        let contract = DocumentContract::new(&user);

        let mut doc = Document {
            title: "Incoming inspection SOP".into(),
            document_number: "SOP-QA/004".into(),
            owner_id: 2,
            ..Default::default()
        };
        assert!(contract.validate(&doc).is_ok());

        doc.document_number = "sop 4".into();
        assert!(contract.validate(&doc).unwrap_err().has_error("document_number"));
    }

    #[test]
    fn test_hierarchy_separation_of_duties() {
        let user = MockUser::manager();
        let contract = DocumentContract::new(&user);

        assert!(contract
            .validate_hierarchy(&ApprovalHierarchy::draft(1, 1, 10, 11, 12))
            .is_ok());

        let errors = contract
            .validate_hierarchy(&ApprovalHierarchy::draft(1, 1, 10, 10, 10))
            .unwrap_err();
        assert!(errors.has_error("checker_id"));
        assert!(errors.has_error("approver_id"));
    }

    #[test]
    fn test_owner_can_manage() {
        let user = MockUser::user(5);
        let contract = DocumentContract::new(&user);
        let doc = Document { owner_id: 5, ..Default::default() };
        assert!(contract.can_manage(&doc));
        let other = Document { owner_id: 6, ..Default::default() };
        assert!(!contract.can_manage(&other));
    }
}
