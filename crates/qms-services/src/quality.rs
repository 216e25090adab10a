//! Audits and non-conformances

use chrono::{NaiveDate, Utc};
use qms_auth::CurrentUser;
use qms_contracts::quality::{AuditContract, NonConformanceContract};
use qms_contracts::Contract;
use qms_core::error::QmsError;
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{AuditChanges, AuditFilter, NcChanges, NcFilter, Stores};
use qms_models::{Audit, AuditStatus, NcStatus, NonConformance, Severity};
use serde::Deserialize;
use tracing::{info, instrument};

// ============================================================================
// Audits
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditParams {
    pub title: String,
    #[serde(default)]
    pub department_id: Option<Id>,
    #[serde(default)]
    pub auditor_id: Option<Id>,
    pub scheduled_date: NaiveDate,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub auditor_id: Option<Id>,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<AuditStatus>,
    #[serde(default)]
    pub findings: Option<String>,
}

impl AuditUpdate {
    /// Whether anything besides findings changes
    fn touches_schedule(&self) -> bool {
        self.title.is_some() || self.auditor_id.is_some() || self.scheduled_date.is_some() || self.status.is_some()
    }
}

#[derive(Clone)]
pub struct AuditService {
    stores: Stores,
}

impl AuditService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    #[instrument(skip(self, user, params), fields(user_id = user.id))]
    pub async fn create(&self, user: &CurrentUser, params: AuditParams) -> QmsResult<Audit> {
        let contract = AuditContract::new(user);
        if !contract.can_manage() {
            return Err(QmsError::forbidden("only managers can schedule audits"));
        }
        let audit = Audit {
            id: None,
            title: params.title.trim().to_string(),
            department_id: params.department_id,
            auditor_id: params.auditor_id,
            scheduled_date: params.scheduled_date,
            status: AuditStatus::Planned,
            findings: None,
            created_at: None,
            updated_at: None,
        };
        contract.validate(&audit)?;

        let audit = self.stores.audits.create(audit).await?;
        info!(audit_id = ?audit.id, "audit scheduled");
        Ok(audit)
    }

    pub async fn list(&self, filter: &AuditFilter, page: &PaginationParams) -> QmsResult<Page<Audit>> {
        Ok(self.stores.audits.list(filter, page).await?)
    }

    pub async fn get(&self, id: Id) -> QmsResult<Audit> {
        self.stores
            .audits
            .find_by_id(id)
            .await?
            .ok_or_else(|| QmsError::not_found("Audit", id))
    }

    #[instrument(skip(self, user, update), fields(user_id = user.id))]
    pub async fn update(&self, user: &CurrentUser, id: Id, update: AuditUpdate) -> QmsResult<Audit> {
        let current = self.get(id).await?;
        let contract = AuditContract::new(user);

        if update.touches_schedule() && !contract.can_manage() {
            return Err(QmsError::forbidden("only managers can reschedule audits"));
        }
        if update.findings.is_some() && !contract.can_record_findings(&current) {
            return Err(QmsError::forbidden("only the auditor can record findings"));
        }
        if let Some(status) = update.status {
            if status != current.status && !current.status.can_advance_to(status) {
                return Err(QmsError::invalid_transition(format!(
                    "cannot move a {} audit to {status}",
                    current.status
                )));
            }
        }

        let mut updated = current.clone();
        if let Some(title) = &update.title {
            updated.title = title.trim().to_string();
        }
        contract.validate(&updated)?;

        let changes = AuditChanges {
            title: update.title.map(|t| t.trim().to_string()),
            auditor_id: update.auditor_id,
            scheduled_date: update.scheduled_date,
            status: update.status,
            findings: update.findings,
        };
        Ok(self.stores.audits.update(id, changes).await?)
    }
}

// ============================================================================
// Non-conformances
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcParams {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub audit_id: Option<Id>,
    #[serde(default)]
    pub department_id: Option<Id>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub assignee_id: Option<Id>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Attribute edits; status only moves through [`NonConformanceService::advance`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub assignee_id: Option<Id>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcAdvance {
    pub status: NcStatus,
    #[serde(default)]
    pub corrective_action: Option<String>,
}

#[derive(Clone)]
pub struct NonConformanceService {
    stores: Stores,
}

impl NonConformanceService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Anyone may raise a non-conformance
    #[instrument(skip(self, user, params), fields(user_id = user.id))]
    pub async fn create(&self, user: &CurrentUser, params: NcParams) -> QmsResult<NonConformance> {
        if let Some(audit_id) = params.audit_id {
            if !self.stores.audits.exists(audit_id).await? {
                return Err(QmsError::invalid("audit_id", "does not exist"));
            }
        }
        let nc = NonConformance {
            id: None,
            title: params.title.trim().to_string(),
            description: params.description,
            audit_id: params.audit_id,
            department_id: params.department_id.or(user.department_id),
            severity: params.severity,
            status: NcStatus::Open,
            corrective_action: None,
            assignee_id: params.assignee_id,
            due_date: params.due_date,
            closed_at: None,
            created_at: None,
            updated_at: None,
        };
        NonConformanceContract::new(user).validate(&nc)?;

        let nc = self.stores.non_conformances.create(nc).await?;
        info!(nc_id = ?nc.id, severity = %nc.severity, "non-conformance raised");
        Ok(nc)
    }

    pub async fn list(&self, filter: &NcFilter, page: &PaginationParams) -> QmsResult<Page<NonConformance>> {
        Ok(self.stores.non_conformances.list(filter, page).await?)
    }

    pub async fn get(&self, id: Id) -> QmsResult<NonConformance> {
        self.stores
            .non_conformances
            .find_by_id(id)
            .await?
            .ok_or_else(|| QmsError::not_found("NonConformance", id))
    }

    #[instrument(skip(self, user, update), fields(user_id = user.id))]
    pub async fn update(&self, user: &CurrentUser, id: Id, update: NcUpdate) -> QmsResult<NonConformance> {
        let current = self.get(id).await?;
        let contract = NonConformanceContract::new(user);
        if !contract.can_edit(&current) {
            return Err(QmsError::forbidden("you cannot edit this non-conformance"));
        }
        if current.status == NcStatus::Closed {
            return Err(QmsError::invalid_transition("closed non-conformances are read-only"));
        }

        let changes = NcChanges {
            title: update.title.map(|t| t.trim().to_string()),
            description: update.description,
            severity: update.severity,
            assignee_id: update.assignee_id,
            due_date: update.due_date,
            ..Default::default()
        };
        let mut updated = current.clone();
        if let Some(title) = &changes.title {
            updated.title = title.clone();
        }
        contract.validate(&updated)?;

        Ok(self.stores.non_conformances.update(id, changes).await?)
    }

    /// Move the status forward; closing needs a manager and a corrective action
    #[instrument(skip(self, user, advance), fields(user_id = user.id, to = %advance.status))]
    pub async fn advance(&self, user: &CurrentUser, id: Id, advance: NcAdvance) -> QmsResult<NonConformance> {
        let current = self.get(id).await?;
        let contract = NonConformanceContract::new(user);
        if !contract.can_edit(&current) {
            return Err(QmsError::forbidden("you cannot edit this non-conformance"));
        }
        if !current.status.can_advance_to(advance.status) {
            return Err(QmsError::invalid_transition(format!(
                "cannot move a {} non-conformance to {}",
                current.status, advance.status
            )));
        }
        let closing = advance.status == NcStatus::Closed;
        if closing && !contract.can_close() {
            return Err(QmsError::forbidden("only managers can close non-conformances"));
        }

        let corrective_action = advance
            .corrective_action
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        let mut updated = current.clone();
        updated.status = advance.status;
        if corrective_action.is_some() {
            updated.corrective_action = corrective_action.clone();
        }
        contract.validate(&updated)?;

        let changes = NcChanges {
            status: Some(advance.status),
            corrective_action,
            closed_at: closing.then(Utc::now),
            ..Default::default()
        };
        let nc = self.stores.non_conformances.update(id, changes).await?;
        info!(nc_id = id, status = %nc.status, "non-conformance advanced");
        Ok(nc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, manager, user, Harness};

    #[tokio::test]
    async fn test_audit_lifecycle() {
        let h = Harness::new();
        let service = h.services().audits;
        let params = AuditParams {
            title: "Q2 internal audit".into(),
            department_id: Some(1),
            auditor_id: Some(9),
            scheduled_date: date(2026, 6, 15),
        };

        let err = service.create(&user(9), params.clone()).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
        let audit = service.create(&manager(), params).await.unwrap();
        let id = audit.id.unwrap();

        let err = service
            .update(&manager(), id, AuditUpdate { status: Some(AuditStatus::Completed), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);

        service
            .update(&manager(), id, AuditUpdate { status: Some(AuditStatus::InProgress), ..Default::default() })
            .await
            .unwrap();

        let with_findings = service
            .update(&user(9), id, AuditUpdate { findings: Some("Two expired calibration tags".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(with_findings.findings.as_deref(), Some("Two expired calibration tags"));

        let err = service
            .update(&user(10), id, AuditUpdate { findings: Some("n/a".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_closing_requires_corrective_action() {
        let h = Harness::new();
        let service = h.services().non_conformances;
        let nc = service
            .create(
                &user(7),
                NcParams {
                    title: "Mislabelled batch".into(),
                    description: None,
                    audit_id: None,
                    department_id: Some(1),
                    severity: Severity::Major,
                    assignee_id: Some(7),
                    due_date: None,
                },
            )
            .await
            .unwrap();
        let id = nc.id.unwrap();

        let investigating = service
            .advance(&user(7), id, NcAdvance { status: NcStatus::UnderInvestigation, corrective_action: None })
            .await
            .unwrap();
        assert_eq!(investigating.status, NcStatus::UnderInvestigation);

        let err = service
            .advance(&user(7), id, NcAdvance { status: NcStatus::Closed, corrective_action: Some("Relabel".into()) })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = service
            .advance(&manager(), id, NcAdvance { status: NcStatus::Closed, corrective_action: None })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);

        let closed = service
            .advance(&manager(), id, NcAdvance { status: NcStatus::Closed, corrective_action: Some("Relabelled and retrained".into()) })
            .await
            .unwrap();
        assert!(closed.closed_at.is_some());

        let err = service
            .advance(&manager(), id, NcAdvance { status: NcStatus::Open, corrective_action: None })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_unknown_audit_reference() {
        let h = Harness::new();
        let err = h
            .services()
            .non_conformances
            .create(
                &user(7),
                NcParams {
                    title: "Orphan".into(),
                    description: None,
                    audit_id: Some(404),
                    department_id: None,
                    severity: Severity::Minor,
                    assignee_id: None,
                    due_date: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 422);
    }
}
