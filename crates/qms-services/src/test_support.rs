//! Shared fixtures for service tests

use chrono::NaiveDate;
use qms_auth::{CurrentUser, JwtService};
use qms_core::config::AppConfig;
use qms_db::{MemoryStore, Stores};
use qms_models::{MemberRole, MemberStatus, TeamMember};
use qms_notifications::{EmailAddress, EmailTemplates, MemoryEmailSender, RetryPolicy};
use std::sync::Arc;

use crate::mailer::Mailer;
use crate::Services;

pub const TEST_SECRET: &[u8] = b"test-secret-key-at-least-32-bytes";

pub fn admin() -> CurrentUser {
    CurrentUser::admin(1, "admin@example.com")
}

pub fn manager() -> CurrentUser {
    CurrentUser::new(2, "manager@example.com", MemberRole::Manager).with_department(1)
}

pub fn user(id: i64) -> CurrentUser {
    CurrentUser::new(id, format!("user{id}@example.com"), MemberRole::User)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn member(email: &str, role: MemberRole, status: MemberStatus) -> TeamMember {
    TeamMember {
        id: None,
        full_name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        role,
        department_id: None,
        status,
        hrone_employee_code: None,
        created_at: None,
        updated_at: None,
    }
}

/// In-memory stores, a recording mail outbox and services wired to both
pub struct Harness {
    pub memory: MemoryStore,
    pub stores: Stores,
    pub outbox: MemoryEmailSender,
    pub mailer: Mailer,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let memory = MemoryStore::new();
        let outbox = MemoryEmailSender::new();
        let mailer = Mailer::new(
            Arc::new(outbox.clone()),
            EmailTemplates::new("https://qms.example.com", EmailAddress::new("qms@example.com")),
        )
        .with_retry(RetryPolicy::immediate(3));
        Self {
            stores: Stores::from_memory(memory.clone()),
            memory,
            outbox,
            mailer,
            config: Arc::new(config),
            jwt: Arc::new(JwtService::new(TEST_SECRET)),
        }
    }

    pub fn services(&self) -> Services {
        Services::new(self.stores.clone(), self.mailer.clone(), self.config.clone(), self.jwt.clone())
    }

    /// Persist a member and return it with its id
    pub async fn add_member(&self, email: &str, role: MemberRole) -> TeamMember {
        self.stores
            .members
            .create(member(email, role, MemberStatus::Active))
            .await
            .unwrap()
    }
}
