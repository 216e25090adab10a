//! Core error types for QMS RS

use std::collections::BTreeMap;
use thiserror::Error;

/// Core error type for all QMS operations
#[derive(Error, Debug)]
pub enum QmsError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid state transition: {message}")]
    InvalidTransition { message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl QmsError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        QmsError::NotFound {
            entity,
            field: "id",
            value: id.to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        QmsError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        QmsError::Forbidden {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        QmsError::Conflict {
            message: message.into(),
        }
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        QmsError::InvalidTransition {
            message: message.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        QmsError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Single-field validation failure
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        QmsError::Validation(errors)
    }
}

/// Validation errors collection
#[derive(Error, Debug, Default, Clone, PartialEq)]
#[error("{}", self.full_messages().join(", "))]
pub struct ValidationErrors {
    /// Field-specific errors: field_name -> Vec<error_messages>
    pub errors: BTreeMap<String, Vec<String>>,
    /// Base errors not tied to a specific field
    pub base_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_base(&mut self, message: impl Into<String>) {
        self.base_errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.base_errors.is_empty()
    }

    /// Check if there are errors for a specific field
    pub fn has_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Get errors for a specific field
    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
        self.base_errors.extend(other.base_errors);
    }

    pub fn full_messages(&self) -> Vec<String> {
        let mut messages = self.base_errors.clone();
        for (field, field_messages) in &self.errors {
            for msg in field_messages {
                messages.push(format!("{} {}", field, msg));
            }
        }
        messages
    }

    /// `Ok(())` when empty, otherwise the collected errors
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// HTTP status code mapping for errors
impl QmsError {
    pub fn status_code(&self) -> u16 {
        match self {
            QmsError::NotFound { .. } => 404,
            QmsError::Unauthorized { .. } => 401,
            QmsError::Forbidden { .. } => 403,
            QmsError::Validation(_) => 422,
            QmsError::InvalidTransition { .. } | QmsError::Conflict { .. } => 409,
            QmsError::Database(_) | QmsError::Internal(_) | QmsError::Config(_) => 500,
            QmsError::ExternalService { .. } => 502,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            QmsError::NotFound { .. } => "not_found",
            QmsError::Unauthorized { .. } => "unauthorized",
            QmsError::Forbidden { .. } => "forbidden",
            QmsError::Validation(_) => "validation_failed",
            QmsError::InvalidTransition { .. } => "invalid_transition",
            QmsError::Database(_) => "database_error",
            QmsError::Internal(_) => "internal_error",
            QmsError::Config(_) => "configuration_error",
            QmsError::ExternalService { .. } => "external_service_error",
            QmsError::Conflict { .. } => "conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collect() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add("title", "can't be blank");
        errors.add_base("task is locked");

        assert!(errors.has_error("title"));
        assert!(!errors.has_error("due_date"));
        assert_eq!(
            errors.full_messages(),
            vec!["task is locked".to_string(), "title can't be blank".to_string()]
        );
    }

    #[test]
    fn test_merge() {
        let mut a = ValidationErrors::new();
        a.add("title", "can't be blank");
        let mut b = ValidationErrors::new();
        b.add("title", "is too long");
        b.add("frequency", "is required");

        a.merge(b);
        assert_eq!(a.get("title").map(Vec::len), Some(2));
        assert!(a.has_error("frequency"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(QmsError::not_found("Task", 1).status_code(), 404);
        assert_eq!(QmsError::invalid("title", "blank").status_code(), 422);
        assert_eq!(QmsError::invalid_transition("no").status_code(), 409);
        assert_eq!(QmsError::external("hrone", "down").status_code(), 502);
        assert_eq!(QmsError::conflict("dup").error_code(), "conflict");
    }
}
