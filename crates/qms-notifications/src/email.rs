//! Email Delivery
//!
//! Messages go out through an [`EmailSender`]. Production uses the HTTP mail
//! relay; without a relay URL messages are only logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qms_core::config::EmailConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Email errors
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("Relay rejected message with status {status}: {body}")]
    Relay { status: u16, body: String },
    #[error("Relay unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type EmailResult<T> = Result<T, EmailError>;

/// Email address with optional name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Format as RFC 5322
    pub fn to_rfc5322(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Email message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cc: Vec<EmailAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<EmailAddress>,
    pub subject: String,
    pub text_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

impl EmailMessage {
    pub fn new(
        from: EmailAddress,
        to: Vec<EmailAddress>,
        subject: impl Into<String>,
        text_body: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from,
            to,
            cc: Vec::new(),
            reply_to: None,
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: None,
            headers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    pub fn cc(mut self, addresses: Vec<EmailAddress>) -> Self {
        self.cc = addresses;
        self
    }

    pub fn reply_to(mut self, address: EmailAddress) -> Self {
        self.reply_to = Some(address);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Tag the message with the QMS entity it is about
    pub fn with_qms_headers(self, entity: &str, id: i64) -> Self {
        self.header("X-QMS-Type", entity).header("X-QMS-Id", id.to_string())
    }

    pub fn recipients(&self) -> impl Iterator<Item = &EmailAddress> {
        self.to.iter().chain(self.cc.iter())
    }
}

/// Email sender trait
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send an email, returning the delivery id
    async fn send(&self, message: &EmailMessage) -> EmailResult<String>;

    /// Check if the sender actually delivers mail
    fn is_configured(&self) -> bool;
}

// ============================================================================
// Senders
// ============================================================================

/// Logs messages instead of delivering them (development)
#[derive(Debug, Default)]
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailSender for ConsoleEmailSender {
    async fn send(&self, message: &EmailMessage) -> EmailResult<String> {
        let to = message
            .recipients()
            .map(EmailAddress::to_rfc5322)
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            id = %message.id,
            from = %message.from.to_rfc5322(),
            %to,
            subject = %message.subject,
            "email not delivered (no relay configured)"
        );
        tracing::debug!(body = %message.text_body, "email body");
        Ok(message.id.clone())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Records messages in memory; can be told to fail the next sends
#[derive(Debug, Clone, Default)]
pub struct MemoryEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    failures: Arc<Mutex<u32>>,
}

impl MemoryEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends with `SendFailed`
    pub fn fail_next(&self, count: u32) {
        *self.failures.lock().unwrap_or_else(PoisonError::into_inner) = count;
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages addressed to one recipient
    pub fn sent_to(&self, email: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.recipients().any(|a| a.email.eq_ignore_ascii_case(email)))
            .collect()
    }
}

#[async_trait]
impl EmailSender for MemoryEmailSender {
    async fn send(&self, message: &EmailMessage) -> EmailResult<String> {
        {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            if *failures > 0 {
                *failures -= 1;
                return Err(EmailError::SendFailed("simulated failure".to_string()));
            }
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(message.id.clone())
    }

    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct RelayPayload<'a> {
    from: &'a EmailAddress,
    to: &'a [EmailAddress],
    #[serde(skip_serializing_if = "<[EmailAddress]>::is_empty")]
    cc: &'a [EmailAddress],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a EmailAddress>,
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "<[(String, String)]>::is_empty")]
    headers: &'a [(String, String)],
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    id: Option<String>,
}

/// Delivers messages as JSON to an HTTP mail relay with a bearer key
#[derive(Debug, Clone)]
pub struct RelayEmailSender {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl RelayEmailSender {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> EmailResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailSender for RelayEmailSender {
    async fn send(&self, message: &EmailMessage) -> EmailResult<String> {
        if message.to.is_empty() {
            return Err(EmailError::InvalidRecipient("message has no recipients".to_string()));
        }

        let payload = RelayPayload {
            from: &message.from,
            to: &message.to,
            cc: &message.cc,
            reply_to: message.reply_to.as_ref(),
            subject: &message.subject,
            text: &message.text_body,
            html: message.html_body.as_deref(),
            headers: &message.headers,
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Relay {
                status: status.as_u16(),
                body,
            });
        }

        // Relays that answer without an id still accepted the message
        let id = response
            .json::<RelayResponse>()
            .await
            .ok()
            .and_then(|r| r.id)
            .unwrap_or_else(|| message.id.clone());
        Ok(id)
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Relay sender when a relay URL is configured, console sender otherwise
pub fn build_sender(config: &EmailConfig) -> EmailResult<Arc<dyn EmailSender>> {
    match &config.relay_url {
        Some(url) => Ok(Arc::new(RelayEmailSender::new(
            url.clone(),
            config.relay_api_key.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )?)),
        None => {
            warn!("email.relay_url is not set; e-mails will only be logged");
            Ok(Arc::new(ConsoleEmailSender::new()))
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Fixed-attempt retry with doubling backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, waiting 1s then 2s
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retrying after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Send with retries; the last error surfaces once every attempt failed
pub async fn send_with_retry(
    sender: &dyn EmailSender,
    message: &EmailMessage,
    policy: RetryPolicy,
) -> EmailResult<String> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match sender.send(message).await {
            Ok(id) => {
                info!(id = %id, subject = %message.subject, attempt, "email sent");
                return Ok(id);
            }
            Err(e) if attempt < attempts => {
                warn!(error = %e, attempt, attempts, "email send failed, retrying");
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
            Err(e) => {
                error!(error = %e, attempts, subject = %message.subject, "email send failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> EmailMessage {
        EmailMessage::new(
            EmailAddress::new("qms@example.com").with_name("QMS"),
            vec![EmailAddress::new("user@example.com")],
            "Test Subject",
            "Test body",
        )
    }

    #[test]
    fn test_email_address_format() {
        let addr = EmailAddress::new("test@example.com").with_name("Test User");
        assert_eq!(addr.to_rfc5322(), "Test User <test@example.com>");
        assert_eq!(EmailAddress::new("no-name@example.com").to_rfc5322(), "no-name@example.com");
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failures() {
        let sender = MemoryEmailSender::new();
        sender.fail_next(2);

        let id = send_with_retry(&sender, &message(), RetryPolicy::immediate(3))
            .await
            .unwrap();
        assert_eq!(id, message_id(&sender));
        assert_eq!(sender.sent().len(), 1);
    }

    fn message_id(sender: &MemoryEmailSender) -> String {
        sender.sent()[0].id.clone()
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_three_attempts() {
        let sender = MemoryEmailSender::new();
        sender.fail_next(3);

        let err = send_with_retry(&sender, &message(), RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::SendFailed(_)));
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_relay_posts_json_with_bearer_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer relay-key"))
            .and(body_partial_json(serde_json::json!({
                "subject": "Test Subject",
                "to": [{ "email": "user@example.com" }],
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({ "id": "relay-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let sender = RelayEmailSender::new(
            format!("{}/send", server.uri()),
            Some("relay-key".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(sender.send(&message()).await.unwrap(), "relay-1");
    }

    #[tokio::test]
    async fn test_relay_error_status_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let sender = RelayEmailSender::new(server.uri(), None, Duration::from_secs(5)).unwrap();
        match sender.send(&message()).await {
            Err(EmailError::Relay { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_console_sender_is_not_configured() {
        let sender = ConsoleEmailSender::new();
        assert!(!sender.is_configured());
        assert!(sender.send(&message()).await.is_ok());
    }
}
