//! Request authentication
//!
//! Resolves the `Authorization` header of a request to a [`CurrentUser`].

use crate::jwt::{extract_bearer_token, JwtError, JwtService};
use crate::permissions::CurrentUser;

use qms_core::error::QmsError;
use std::sync::Arc;
use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Required,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Token expired")]
    TokenExpired,
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::Missing => AuthError::Required,
            JwtError::Invalid(_) | JwtError::EncodingFailed(_) => AuthError::InvalidCredentials,
        }
    }
}

impl From<AuthError> for QmsError {
    fn from(err: AuthError) -> Self {
        QmsError::unauthorized(err.to_string())
    }
}

/// Bearer-token authenticator
#[derive(Clone)]
pub struct Authenticator {
    jwt: Arc<JwtService>,
}

impl Authenticator {
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }

    /// Authenticate from the raw `Authorization` header value
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<CurrentUser, AuthError> {
        let header = authorization.ok_or(AuthError::Required)?;
        let token = extract_bearer_token(header).ok_or(AuthError::InvalidCredentials)?;

        let claims = self.jwt.validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            AuthError::from(e)
        })?;

        Ok(CurrentUser::from_claims(&claims)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qms_models::{MemberRole, MemberStatus, TeamMember};

    fn authenticator() -> (Authenticator, Arc<JwtService>) {
        let jwt = Arc::new(JwtService::new(b"test-secret-key-at-least-32-bytes"));
        (Authenticator::new(jwt.clone()), jwt)
    }

    #[test]
    fn test_valid_bearer_token() {
        let (auth, jwt) = authenticator();
        let member = TeamMember {
            id: Some(5),
            full_name: "Meera".into(),
            email: "meera@example.com".into(),
            role: MemberRole::User,
            department_id: None,
            status: MemberStatus::Active,
            hrone_employee_code: None,
            created_at: None,
            updated_at: None,
        };
        let token = jwt.create_token(&member, 600).unwrap();

        let user = auth.authenticate(Some(&format!("Bearer {token}"))).unwrap();
        assert_eq!(user.id, 5);
        assert_eq!(user.role, MemberRole::User);
    }

    #[test]
    fn test_missing_and_malformed_headers() {
        let (auth, _) = authenticator();
        assert!(matches!(auth.authenticate(None), Err(AuthError::Required)));
        assert!(matches!(
            auth.authenticate(Some("Basic Zm9vOmJhcg==")),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate(Some("Bearer not-a-jwt")),
            Err(AuthError::InvalidCredentials)
        ));

        let err: QmsError = AuthError::TokenExpired.into();
        assert_eq!(err.status_code(), 401);
    }
}
