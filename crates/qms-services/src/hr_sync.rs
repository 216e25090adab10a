//! HROne synchronisation
//!
//! Departments are matched by their HROne id, employees by e-mail. Row-level
//! failures are counted in the report and never abort the run.

use qms_auth::CurrentUser;
use qms_core::config::AppConfig;
use qms_core::QmsResult;
use qms_db::Stores;
use qms_hrone::{HrEmployeePush, HrOneClient};
use qms_models::MemberRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Operation requested from the `hrone-integration` function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncAction {
    ImportDepartments,
    ImportEmployees,
    ExportMembers,
    /// Departments, then employees
    #[default]
    Import,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Clone)]
pub struct HrSyncService {
    stores: Stores,
    config: Arc<AppConfig>,
}

impl HrSyncService {
    pub fn new(stores: Stores, config: Arc<AppConfig>) -> Self {
        Self { stores, config }
    }

    fn client(&self) -> QmsResult<HrOneClient> {
        Ok(HrOneClient::from_config(&self.config.hrone)?)
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn run(&self, user: &CurrentUser, action: SyncAction) -> QmsResult<SyncReport> {
        user.require_admin()?;
        let client = self.client()?;
        let report = match action {
            SyncAction::ImportDepartments => self.import_departments(&client).await?,
            SyncAction::ImportEmployees => self.import_employees(&client).await?,
            SyncAction::ExportMembers => self.export_members(&client).await?,
            SyncAction::Import => {
                let mut report = self.import_departments(&client).await?;
                report += self.import_employees(&client).await?;
                report
            }
        };
        info!(?action, ?report, "HROne sync finished");
        Ok(report)
    }

    pub async fn import_departments(&self, client: &HrOneClient) -> QmsResult<SyncReport> {
        let mut report = SyncReport::default();
        for department in client.list_departments().await? {
            if department.name.trim().is_empty() {
                report.skipped += 1;
                continue;
            }
            match self.stores.departments.upsert_by_hrone_id(department.to_department()).await {
                Ok(upserted) if upserted.created => report.created += 1,
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(hrone_id = %department.id, error = %e, "department import failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    pub async fn import_employees(&self, client: &HrOneClient) -> QmsResult<SyncReport> {
        let departments: HashMap<String, i64> = self
            .stores
            .departments
            .list_all()
            .await?
            .into_iter()
            .filter_map(|d| Some((d.name.to_lowercase(), d.id?)))
            .collect();

        let mut report = SyncReport::default();
        for employee in client.list_employees().await? {
            let department_id = employee
                .department_name
                .as_deref()
                .and_then(|name| departments.get(&name.trim().to_lowercase()).copied());
            let Some(member) = employee.to_member(department_id) else {
                report.skipped += 1;
                continue;
            };
            match self.stores.members.upsert_by_email(member).await {
                Ok(upserted) if upserted.created => report.created += 1,
                Ok(_) => report.updated += 1,
                Err(e) => {
                    warn!(employee_code = %employee.employee_code, error = %e, "employee import failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Push active members; a successful push counts as updated
    pub async fn export_members(&self, client: &HrOneClient) -> QmsResult<SyncReport> {
        let departments: HashMap<i64, String> = self
            .stores
            .departments
            .list_all()
            .await?
            .into_iter()
            .filter_map(|d| Some((d.id?, d.name)))
            .collect();
        let members = self
            .stores
            .members
            .active_with_roles(&[MemberRole::Admin, MemberRole::Manager, MemberRole::User])
            .await?;

        let mut report = SyncReport::default();
        for member in members {
            let department_name = member.department_id.and_then(|id| departments.get(&id).cloned());
            let push = HrEmployeePush::from_member(&member, department_name);
            match client.push_employee(&push).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!(member_id = ?member.id, error = %e, "member export failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, manager, Harness};
    use qms_models::MemberStatus;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn harness_for(server: &MockServer) -> Harness {
        let mut config = AppConfig::default();
        config.hrone.base_url = server.uri();
        config.hrone.api_token = Some("hr-token".into());
        Harness::with_config(config)
    }

    #[tokio::test]
    async fn test_import_departments_then_employees() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/departments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "departmentId": 11, "departmentName": "Production", "departmentCode": "PRD" },
                    { "departmentId": 12, "departmentName": "Quality" }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/employees"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "employeeId": "E1", "employeeName": "Kiran Shah", "officialEmail": "kiran@example.com",
                  "departmentName": "production", "status": "Active" },
                { "employeeId": "E2", "employeeName": "Left Already", "officialEmail": "left@example.com",
                  "status": "Resigned" },
                { "employeeId": "E3", "employeeName": "No Mail" }
            ])))
            .mount(&server)
            .await;

        let h = harness_for(&server);
        h.add_member("left@example.com", MemberRole::User).await;
        let service = h.services().hr_sync;

        let report = service.run(&admin(), SyncAction::Import).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                created: 3,
                updated: 1,
                skipped: 1,
                failed: 0
            }
        );

        let kiran = h.stores.members.find_by_email("kiran@example.com").await.unwrap().unwrap();
        let production = h.stores.departments.find_by_name("Production").await.unwrap().unwrap();
        assert_eq!(kiran.department_id, production.id);
        assert_eq!(kiran.hrone_employee_code.as_deref(), Some("E1"));

        let left = h.stores.members.find_by_email("left@example.com").await.unwrap().unwrap();
        assert_eq!(left.status, MemberStatus::Inactive);

        // Second run only updates
        let again = service.run(&admin(), SyncAction::ImportDepartments).await.unwrap();
        assert_eq!(again.updated, 2);
        assert_eq!(again.created, 0);
    }

    #[tokio::test]
    async fn test_export_counts_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/employees"))
            .and(body_partial_json(json!({ "email": "ok@example.com" })))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/employees"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let h = harness_for(&server);
        h.add_member("ok@example.com", MemberRole::User).await;
        h.add_member("broken@example.com", MemberRole::User).await;

        let report = h.services().hr_sync.run(&admin(), SyncAction::ExportMembers).await.unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_requires_admin_and_token() {
        let h = Harness::new();
        let service = h.services().hr_sync;

        let err = service.run(&manager(), SyncAction::Import).await.unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = service.run(&admin(), SyncAction::Import).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
