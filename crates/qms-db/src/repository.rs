//! Repository traits and base implementations
//!
//! Provides generic CRUD operations for database entities.

use async_trait::async_trait;
use qms_core::error::QmsError;
use qms_core::traits::Id;
use qms_models::UnknownVariant;

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(#[from] UnknownVariant),
}

impl RepositoryError {
    pub fn not_found(entity: &str, id: Id) -> Self {
        RepositoryError::NotFound(format!("{} with id {}", entity, id))
    }

    /// Map unique-constraint violations to `Conflict`, leaving other errors as they are
    pub fn from_insert(err: sqlx::Error, message: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(message.to_string())
            }
            _ => RepositoryError::Database(err),
        }
    }
}

impl From<RepositoryError> for QmsError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => QmsError::NotFound {
                entity: "record",
                field: "id",
                value: what,
            },
            RepositoryError::Conflict(message) => QmsError::Conflict { message },
            RepositoryError::Validation(message) => QmsError::invalid("base", message),
            RepositoryError::Database(e) => QmsError::Database(e.to_string()),
            RepositoryError::InvalidData(e) => QmsError::Database(e.to_string()),
        }
    }
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Base repository trait for CRUD operations
#[async_trait]
pub trait Repository<T, CreateDto, UpdateDto>: Send + Sync {
    /// Find an entity by ID
    async fn find_by_id(&self, id: Id) -> RepositoryResult<Option<T>>;

    /// Find all entities with pagination
    async fn find_all(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<T>>;

    /// Count all entities
    async fn count(&self) -> RepositoryResult<i64>;

    /// Create a new entity
    async fn create(&self, dto: CreateDto) -> RepositoryResult<T>;

    /// Update an existing entity
    async fn update(&self, id: Id, dto: UpdateDto) -> RepositoryResult<T>;

    /// Delete an entity by ID
    async fn delete(&self, id: Id) -> RepositoryResult<()>;

    /// Check if an entity exists
    async fn exists(&self, id: Id) -> RepositoryResult<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: QmsError = RepositoryError::not_found("Task", 4).into();
        assert_eq!(err.status_code(), 404);

        let err: QmsError = RepositoryError::Conflict("taken".into()).into();
        assert_eq!(err.error_code(), "conflict");

        let err: QmsError = RepositoryError::InvalidData(UnknownVariant {
            kind: "task status",
            value: "done".into(),
        })
        .into();
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_row_not_found_is_a_database_error() {
        let err = RepositoryError::from_insert(sqlx::Error::RowNotFound, "duplicate");
        assert!(matches!(err, RepositoryError::Database(_)));
    }
}
