//! Dashboard report

use chrono::NaiveDate;
use qms_contracts::is_valid_email;
use qms_core::config::AppConfig;
use qms_core::error::QmsError;
use qms_core::QmsResult;
use qms_db::{DashboardStats, Stores, TableCount};
use qms_models::MemberRole;
use qms_notifications::{DashboardDigest, DepartmentLine, EmailAddress};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::mailer::Mailer;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub date: NaiveDate,
    pub total_tasks: i64,
    #[serde(flatten)]
    pub stats: DashboardStats,
}

impl DashboardReport {
    fn digest(&self) -> DashboardDigest {
        let mut totals = vec![("Total tasks".to_string(), self.total_tasks)];
        totals.extend(
            self.stats
                .tasks_by_status
                .iter()
                .map(|(status, count)| (format!("Tasks {status}"), *count)),
        );
        totals.extend([
            ("Overdue".to_string(), self.stats.overdue),
            ("Completed in the last day".to_string(), self.stats.completed_last_day),
            ("Pending document approvals".to_string(), self.stats.pending_document_approvals),
            ("Open non-conformances".to_string(), self.stats.open_non_conformances),
        ]);

        DashboardDigest {
            date: self.date,
            totals,
            departments: self
                .stats
                .departments
                .iter()
                .map(|d| DepartmentLine {
                    name: d.department.clone(),
                    total: d.total,
                    open: d.open,
                    overdue: d.overdue,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDelivery {
    pub message_id: String,
    pub recipients: Vec<String>,
    pub report: DashboardReport,
}

#[derive(Clone)]
pub struct DashboardReportService {
    stores: Stores,
    mailer: Mailer,
    config: Arc<AppConfig>,
}

impl DashboardReportService {
    pub fn new(stores: Stores, mailer: Mailer, config: Arc<AppConfig>) -> Self {
        Self { stores, mailer, config }
    }

    pub async fn build(&self, today: NaiveDate) -> QmsResult<DashboardReport> {
        let stats = self.stores.reports.dashboard_stats(today).await?;
        Ok(DashboardReport {
            date: today,
            total_tasks: stats.total_tasks(),
            stats,
        })
    }

    /// Row counts of the QMS tables, for database-utils
    pub async fn table_counts(&self) -> QmsResult<Vec<TableCount>> {
        Ok(self.stores.reports.table_counts().await?)
    }

    /// Explicit list first, then configured recipients, then active admins and managers
    async fn recipients(&self, explicit: Option<Vec<String>>) -> QmsResult<Vec<String>> {
        let mut recipients = match explicit.filter(|r| !r.is_empty()) {
            Some(list) => list,
            None if !self.config.report.recipients.is_empty() => self.config.report.recipients.clone(),
            None => self
                .stores
                .members
                .active_with_roles(&[MemberRole::Admin, MemberRole::Manager])
                .await?
                .into_iter()
                .map(|m| m.email)
                .collect(),
        };
        for r in recipients.iter_mut() {
            *r = r.trim().to_lowercase();
        }
        recipients.sort();
        recipients.dedup();

        if let Some(bad) = recipients.iter().find(|r| !is_valid_email(r)) {
            return Err(QmsError::invalid("recipients", format!("{bad} is not a valid e-mail address")));
        }
        if recipients.is_empty() {
            return Err(QmsError::invalid("recipients", "no one to send the report to"));
        }
        Ok(recipients)
    }

    #[instrument(skip(self, recipients))]
    pub async fn send(&self, today: NaiveDate, recipients: Option<Vec<String>>) -> QmsResult<ReportDelivery> {
        let recipients = self.recipients(recipients).await?;
        let report = self.build(today).await?;

        let to = recipients.iter().map(EmailAddress::new).collect();
        let message = self.mailer.templates().dashboard_report(to, &report.digest());
        let message_id = self.mailer.deliver(&message).await?;
        info!(recipients = recipients.len(), %message_id, "dashboard report sent");

        Ok(ReportDelivery {
            message_id,
            recipients,
            report,
        })
    }
}
