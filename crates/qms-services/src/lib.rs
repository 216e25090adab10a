//! # qms-services
//!
//! Business logic services for QMS RS.
//!
//! Services check permissions through the contracts, persist through the
//! `qms-db` store traits and notify people through the mailer. They return
//! [`QmsResult`](qms_core::QmsResult) so handlers can map failures straight
//! to HTTP responses.

pub mod accounts;
pub mod admin;
pub mod auth;
pub mod documents;
pub mod hr_sync;
pub mod invitations;
pub mod mailer;
pub mod members;
pub mod quality;
pub mod reports;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_support;

pub use accounts::{AccountService, SignupParams};
pub use admin::{AdminBootstrapService, CreateAdminParams};
pub use auth::{OtpIssued, OtpLoginService, OtpVerification};
pub use documents::{DocumentParams, DocumentView, DocumentWorkflowService, RevisionParams};
pub use hr_sync::{HrSyncService, SyncAction, SyncReport};
pub use invitations::{InvitationParams, InvitationService};
pub use mailer::{Mailer, SendEmailParams};
pub use members::{DepartmentParams, DepartmentService, MemberUpdate, TeamMemberService};
pub use quality::{
    AuditParams, AuditService, AuditUpdate, NcAdvance, NcParams, NcUpdate, NonConformanceService,
};
pub use reports::{DashboardReport, DashboardReportService, ReportDelivery};
pub use tasks::{AutomationReport, StatusChange, TaskAutomationService, TaskCreated, TaskParams, TaskService};

use qms_auth::JwtService;
use qms_core::config::AppConfig;
use qms_db::Stores;
use std::sync::Arc;

/// Every service wired to the same stores, mailer and configuration
#[derive(Clone)]
pub struct Services {
    pub tasks: TaskService,
    pub automation: TaskAutomationService,
    pub documents: DocumentWorkflowService,
    pub accounts: AccountService,
    pub otp: OtpLoginService,
    pub invitations: InvitationService,
    pub members: TeamMemberService,
    pub departments: DepartmentService,
    pub audits: AuditService,
    pub non_conformances: NonConformanceService,
    pub reports: DashboardReportService,
    pub hr_sync: HrSyncService,
    pub admin: AdminBootstrapService,
    pub mailer: Mailer,
}

impl Services {
    pub fn new(stores: Stores, mailer: Mailer, config: Arc<AppConfig>, jwt: Arc<JwtService>) -> Self {
        Self {
            tasks: TaskService::new(stores.clone(), mailer.clone()),
            automation: TaskAutomationService::new(stores.clone()),
            documents: DocumentWorkflowService::new(stores.clone(), mailer.clone()),
            accounts: AccountService::new(stores.clone(), mailer.clone()),
            otp: OtpLoginService::new(stores.clone(), mailer.clone(), config.clone(), jwt),
            invitations: InvitationService::new(stores.clone(), mailer.clone()),
            members: TeamMemberService::new(stores.clone()),
            departments: DepartmentService::new(stores.clone()),
            audits: AuditService::new(stores.clone()),
            non_conformances: NonConformanceService::new(stores.clone()),
            reports: DashboardReportService::new(stores.clone(), mailer.clone(), config.clone()),
            hr_sync: HrSyncService::new(stores.clone(), config.clone()),
            admin: AdminBootstrapService::new(stores, config),
            mailer,
        }
    }
}
