//! Outgoing mail
//!
//! Workflow notifications are best-effort: a failed send is logged and the
//! workflow step stands. Messages that are the point of the request (codes,
//! invitations, reports, `send-email`) use [`Mailer::deliver`] and fail it.

use qms_contracts::{validate_email, validate_required, UserContext};
use qms_core::error::{QmsError, ValidationErrors};
use qms_core::QmsResult;
use qms_notifications::{send_with_retry, EmailAddress, EmailMessage, EmailSender, EmailTemplates, RetryPolicy};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{instrument, warn};

#[derive(Clone)]
pub struct Mailer {
    sender: Arc<dyn EmailSender>,
    templates: EmailTemplates,
    retry: RetryPolicy,
}

/// Body of the `send-email` function
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailParams {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
}

impl Mailer {
    pub fn new(sender: Arc<dyn EmailSender>, templates: EmailTemplates) -> Self {
        Self {
            sender,
            templates,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn templates(&self) -> &EmailTemplates {
        &self.templates
    }

    pub fn is_configured(&self) -> bool {
        self.sender.is_configured()
    }

    /// Send with retries and surface the failure
    pub async fn deliver(&self, message: &EmailMessage) -> QmsResult<String> {
        send_with_retry(self.sender.as_ref(), message, self.retry)
            .await
            .map_err(|e| QmsError::external("email", e.to_string()))
    }

    /// Send with retries; failures are only logged
    pub async fn notify(&self, message: &EmailMessage) {
        if let Err(e) = send_with_retry(self.sender.as_ref(), message, self.retry).await {
            warn!(error = %e, subject = %message.subject, "notification e-mail dropped");
        }
    }

    /// The `send-email` function: managers mail arbitrary recipients
    #[instrument(skip(self, user, params), fields(user_id = user.id()))]
    pub async fn send_custom<U: UserContext>(&self, user: &U, params: SendEmailParams) -> QmsResult<String> {
        if !user.is_manager() {
            return Err(QmsError::forbidden("only managers can send e-mails"));
        }

        let mut errors = ValidationErrors::new();
        if params.to.is_empty() {
            errors.add("to", "can't be blank");
        }
        for address in &params.to {
            validate_email("to", address, &mut errors);
        }
        validate_required("subject", &params.subject, 255, &mut errors);
        validate_required("text", &params.text, 100_000, &mut errors);
        errors.into_result()?;

        let to = params.to.iter().map(|a| EmailAddress::new(a.trim())).collect();
        let message = self
            .templates
            .custom(to, &params.subject, &params.text, params.html.as_deref());
        self.deliver(&message).await
    }
}
