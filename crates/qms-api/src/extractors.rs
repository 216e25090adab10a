//! Axum extractors and shared state for API handlers

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use qms_auth::{Authenticator, CurrentUser};
use qms_core::config::AppConfig;
use qms_core::pagination::PaginationParams;
use qms_db::Database;
use qms_services::Services;
use std::sync::Arc;

use crate::error::ApiError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub authenticator: Arc<Authenticator>,
    pub config: Arc<AppConfig>,
    /// Present when running against PostgreSQL; used for pool statistics
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(services: Services, authenticator: Arc<Authenticator>, config: Arc<AppConfig>) -> Self {
        Self {
            services,
            authenticator,
            config,
            database: None,
        }
    }

    pub fn with_database(mut self, database: Database) -> Self {
        self.database = Some(database);
        self
    }
}

/// Authenticated user extractor
pub struct AuthenticatedUser(pub CurrentUser);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let user = app_state.authenticator.authenticate(header)?;
        Ok(AuthenticatedUser(user))
    }
}

impl std::ops::Deref for AuthenticatedUser {
    type Target = CurrentUser;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Pagination from the `page` / `perPage` query parameters.
///
/// List queries carry these fields themselves; `#[serde(flatten)]` does not
/// parse numbers from query strings.
pub fn pagination(page: Option<i64>, per_page: Option<i64>) -> PaginationParams {
    let defaults = PaginationParams::default();
    PaginationParams::new(page.unwrap_or(defaults.page), per_page.unwrap_or(defaults.per_page))
}
