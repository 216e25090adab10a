//! Router fixtures backed by in-memory stores

use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use qms_auth::{Authenticator, JwtService};
use qms_core::config::AppConfig;
use qms_db::{Repository, Stores};
use qms_models::{MemberRole, MemberStatus, TeamMember};
use qms_notifications::{EmailAddress, EmailTemplates, MemoryEmailSender, RetryPolicy};
use qms_services::{Mailer, Services};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crate::{router, AppState};

const TEST_SECRET: &[u8] = b"api-test-secret-key-of-32-bytes!";

pub struct TestApp {
    pub stores: Stores,
    pub outbox: MemoryEmailSender,
    jwt: Arc<JwtService>,
    app: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let stores = Stores::memory();
        let outbox = MemoryEmailSender::new();
        let mailer = Mailer::new(
            Arc::new(outbox.clone()),
            EmailTemplates::new("https://qms.example.com", EmailAddress::new("qms@example.com")),
        )
        .with_retry(RetryPolicy::immediate(3));
        let jwt = Arc::new(JwtService::new(TEST_SECRET));
        let config = Arc::new(config);
        let services = Services::new(stores.clone(), mailer, config.clone(), jwt.clone());
        let state = AppState::new(services, Arc::new(Authenticator::new(jwt.clone())), config);

        Self {
            stores,
            outbox,
            jwt,
            app: router().with_state(state),
        }
    }

    /// Persist an active member and return a bearer token for it
    pub async fn login(&self, email: &str, role: MemberRole) -> (TeamMember, String) {
        let member = self
            .stores
            .members
            .create(TeamMember {
                id: None,
                full_name: email.to_string(),
                email: email.to_string(),
                role,
                department_id: None,
                status: MemberStatus::Active,
                hrone_employee_code: None,
                created_at: None,
                updated_at: None,
            })
            .await
            .unwrap();
        let token = self.jwt.create_token(&member, 3600).unwrap();
        (member, token)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

pub async fn json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
