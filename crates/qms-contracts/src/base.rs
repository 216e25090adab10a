//! Base contract system

use qms_core::error::ValidationErrors;
use qms_core::traits::Id;
use qms_models::MemberRole;
use regex::Regex;
use std::sync::OnceLock;
use validator::Validate;

/// Result of contract validation
pub type ValidationResult = Result<(), ValidationErrors>;

/// Trait for user context in contracts
pub trait UserContext: Send + Sync {
    fn id(&self) -> Id;
    fn role(&self) -> MemberRole;
    fn department_id(&self) -> Option<Id>;

    fn is_admin(&self) -> bool {
        self.role() == MemberRole::Admin
    }

    /// Admins and managers run the QMS; plain users work on what they are given
    fn is_manager(&self) -> bool {
        matches!(self.role(), MemberRole::Admin | MemberRole::Manager)
    }
}

/// Base contract trait
pub trait Contract<T>: Send + Sync {
    /// Validate the entity
    fn validate(&self, entity: &T) -> ValidationResult;
}

/// Merge the `#[validate]` attribute rules of a model into `errors`
pub fn validate_attributes<T: Validate>(value: &T, errors: &mut ValidationErrors) {
    let Err(failed) = value.validate() else {
        return;
    };
    for (field, field_errors) in failed.field_errors() {
        for error in field_errors {
            let message = match (error.code.as_ref(), error.params.get("max")) {
                ("length", Some(max)) if error.params.get("min").is_some() => {
                    format!("must be between {} and {} characters", error.params["min"], max)
                }
                ("length", Some(max)) => format!("is too long (maximum is {} characters)", max),
                (code, _) => format!("is invalid ({})", code),
            };
            errors.add(field, message);
        }
    }
}

/// Validate a required text attribute with a maximum length
pub fn validate_required(field: &str, value: &str, max: usize, errors: &mut ValidationErrors) {
    if value.trim().is_empty() {
        errors.add(field, "can't be blank");
    } else if value.chars().count() > max {
        errors.add(field, format!("is too long (maximum is {} characters)", max));
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

pub fn validate_email(field: &str, email: &str, errors: &mut ValidationErrors) {
    if email.trim().is_empty() {
        errors.add(field, "can't be blank");
    } else if !is_valid_email(email) {
        errors.add(field, "is not a valid email address");
    }
}
