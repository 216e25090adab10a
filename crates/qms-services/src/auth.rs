//! Passwordless login with e-mailed one-time codes

use chrono::{DateTime, Utc};
use qms_auth::otp::expires_at;
use qms_auth::{codes_match, generate_code, JwtService};
use qms_contracts::is_valid_email;
use qms_core::config::AppConfig;
use qms_core::error::QmsError;
use qms_core::QmsResult;
use qms_db::Stores;
use qms_models::TeamMember;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::mailer::Mailer;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpIssued {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerification {
    pub verified: bool,
    /// Issued only when the address belongs to an active team member
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<TeamMember>,
}

#[derive(Clone)]
pub struct OtpLoginService {
    stores: Stores,
    mailer: Mailer,
    config: Arc<AppConfig>,
    jwt: Arc<JwtService>,
}

fn normalize(email: &str) -> QmsResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(QmsError::invalid("email", "is not a valid e-mail address"));
    }
    Ok(email)
}

impl OtpLoginService {
    pub fn new(stores: Stores, mailer: Mailer, config: Arc<AppConfig>, jwt: Arc<JwtService>) -> Self {
        Self {
            stores,
            mailer,
            config,
            jwt,
        }
    }

    #[instrument(skip(self))]
    pub async fn request_code(&self, email: &str) -> QmsResult<OtpIssued> {
        let email = normalize(email)?;
        let ttl = self.config.auth.otp_ttl_minutes;
        let code = generate_code();
        let otp = self
            .stores
            .otp
            .insert_code(&email, &code, expires_at(Utc::now(), ttl))
            .await?;

        let message = self.mailer.templates().otp_code(&email, &code, ttl);
        self.mailer.deliver(&message).await?;
        info!(otp_id = ?otp.id, "login code issued");

        Ok(OtpIssued {
            email,
            expires_at: otp.expires_at,
        })
    }

    /// Only the newest unverified, unexpired code for the address is accepted
    #[instrument(skip(self, code))]
    pub async fn verify(&self, email: &str, code: &str) -> QmsResult<OtpVerification> {
        let email = normalize(email)?;
        let Some(otp) = self.stores.otp.latest_usable(&email, Utc::now()).await? else {
            return Err(QmsError::unauthorized("code is invalid or expired"));
        };
        let otp_id = otp
            .id
            .ok_or_else(|| QmsError::Internal("stored code without id".into()))?;
        if !codes_match(&otp.code, code) {
            let max_attempts = self.config.auth.otp_max_attempts;
            let attempts = self.stores.otp.record_failed_attempt(otp_id, max_attempts).await?;
            warn!(otp_id, attempts, "login code mismatch");
            if attempts >= max_attempts {
                return Err(QmsError::unauthorized("too many attempts, request a new code"));
            }
            return Err(QmsError::unauthorized("code is invalid or expired"));
        }
        if !self.stores.otp.mark_verified(otp_id).await? {
            return Err(QmsError::unauthorized("code has already been used"));
        }

        let member = self
            .stores
            .members
            .find_by_email(&email)
            .await?
            .filter(TeamMember::is_active);
        let token = match &member {
            Some(member) => Some(
                self.jwt
                    .create_token(member, self.config.auth.token_expiration_seconds)
                    .map_err(|e| QmsError::Internal(e.to_string()))?,
            ),
            None => None,
        };
        info!(member_id = ?member.as_ref().and_then(|m| m.id), "login code verified");

        Ok(OtpVerification {
            verified: true,
            token,
            member,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Harness, TEST_SECRET};
    use qms_models::MemberRole;

    async fn issued_code(h: &Harness, email: &str) -> String {
        h.stores
            .otp
            .latest_usable(email, Utc::now())
            .await
            .unwrap()
            .unwrap()
            .code
    }

    #[tokio::test]
    async fn test_code_is_mailed_and_verifies_once() {
        let h = Harness::new();
        let member = h.add_member("lead@example.com", MemberRole::Manager).await;
        let service = h.services().otp;

        let issued = service.request_code("Lead@Example.com").await.unwrap();
        assert_eq!(issued.email, "lead@example.com");
        let code = issued_code(&h, "lead@example.com").await;
        assert!(h.outbox.sent_to("lead@example.com")[0].text_body.contains(&code));

        let verification = service.verify("lead@example.com", &code).await.unwrap();
        assert!(verification.verified);
        let token = verification.token.unwrap();
        let claims = JwtService::new(TEST_SECRET).validate_token(&token).unwrap();
        assert_eq!(claims.sub, member.id.unwrap().to_string());

        let err = service.verify("lead@example.com", &code).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_only_newest_code_counts() {
        let h = Harness::new();
        let service = h.services().otp;

        service.request_code("guest@example.com").await.unwrap();
        let old = issued_code(&h, "guest@example.com").await;
        service.request_code("guest@example.com").await.unwrap();
        let new = issued_code(&h, "guest@example.com").await;

        if old != new {
            let err = service.verify("guest@example.com", &old).await.unwrap_err();
            assert_eq!(err.status_code(), 401);
        }

        // Not a team member: verified, but no session
        let verification = service.verify("guest@example.com", &new).await.unwrap();
        assert!(verification.verified);
        assert!(verification.token.is_none());
    }

    #[tokio::test]
    async fn test_code_burns_after_too_many_wrong_guesses() {
        let h = Harness::new();
        h.add_member("lead@example.com", MemberRole::Manager).await;
        let service = h.services().otp;
        service.request_code("lead@example.com").await.unwrap();
        let code = issued_code(&h, "lead@example.com").await;
        let wrong = if code == "000000" { "111111" } else { "000000" };

        for _ in 0..h.config.auth.otp_max_attempts {
            let err = service.verify("lead@example.com", wrong).await.unwrap_err();
            assert_eq!(err.status_code(), 401);
        }

        let err = service.verify("lead@example.com", &code).await.unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert!(h.stores.otp.latest_usable("lead@example.com", Utc::now()).await.unwrap().is_none());

        // A fresh code starts a fresh budget
        service.request_code("lead@example.com").await.unwrap();
        let fresh = issued_code(&h, "lead@example.com").await;
        let wrong = if fresh == "000000" { "111111" } else { "000000" };
        assert!(service.verify("lead@example.com", wrong).await.is_err());
        assert!(service.verify("lead@example.com", &fresh).await.unwrap().verified);
    }

    #[tokio::test]
    async fn test_mail_failure_surfaces() {
        let h = Harness::new();
        h.outbox.fail_next(3);
        let err = h.services().otp.request_code("lead@example.com").await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }
}
