//! Document approval workflow
//!
//! Each revision is signed off by its initiator, then its checker, then its
//! approver. The checker or approver may reject while the revision waits on
//! them. Decisions never move the hierarchy backwards; a rejected document
//! continues with a new revision.

use chrono::Utc;
use qms_contracts::documents::DocumentContract;
use qms_contracts::{Contract, UserContext};
use qms_core::error::QmsError;
use qms_core::pagination::{Page, PaginationParams};
use qms_core::traits::Id;
use qms_core::QmsResult;
use qms_db::repository::Repository;
use qms_db::{DocumentDetail, DocumentFilter, NewRevision, Participants, Stores};
use qms_models::{ApprovalHierarchy, ApprovalRole, Document, DocumentRevision, HierarchyStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::mailer::Mailer;

/// Attributes for a new document and its first revision
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentParams {
    pub title: String,
    pub document_number: String,
    #[serde(default)]
    pub department_id: Option<Id>,
    pub checker_id: Id,
    pub approver_id: Id,
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub change_summary: Option<String>,
}

/// A new revision; sign-off participants default to the previous revision's
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionParams {
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub change_summary: Option<String>,
    #[serde(default)]
    pub checker_id: Option<Id>,
    #[serde(default)]
    pub approver_id: Option<Id>,
}

/// A document with its full revision history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub document: Document,
    pub revisions: Vec<DocumentRevision>,
    pub hierarchy: Option<ApprovalHierarchy>,
}

fn new_revision(file_path: String, file_name: String, change_summary: Option<String>, uploaded_by: Id) -> QmsResult<NewRevision> {
    if file_path.trim().is_empty() {
        return Err(QmsError::invalid("file_path", "can't be blank"));
    }
    if file_name.trim().is_empty() {
        return Err(QmsError::invalid("file_name", "can't be blank"));
    }
    Ok(NewRevision {
        file_path,
        file_name,
        change_summary,
        uploaded_by,
    })
}

#[derive(Clone)]
pub struct DocumentWorkflowService {
    stores: Stores,
    mailer: Mailer,
}

impl DocumentWorkflowService {
    pub fn new(stores: Stores, mailer: Mailer) -> Self {
        Self { stores, mailer }
    }

    async fn load(&self, id: Id) -> QmsResult<Document> {
        self.stores
            .documents
            .find_document(id)
            .await?
            .ok_or_else(|| QmsError::not_found("Document", id))
    }

    async fn load_hierarchy(&self, id: Id) -> QmsResult<ApprovalHierarchy> {
        self.stores
            .documents
            .current_hierarchy(id)
            .await?
            .ok_or_else(|| QmsError::not_found("ApprovalHierarchy", id))
    }

    /// Sign-off participants must be active members
    async fn ensure_participant(&self, field: &str, id: Id) -> QmsResult<()> {
        match self.stores.members.find_by_id(id).await? {
            Some(member) if member.is_active() => Ok(()),
            Some(_) => Err(QmsError::invalid(field, "is not an active team member")),
            None => Err(QmsError::invalid(field, "does not exist")),
        }
    }

    async fn check_participants<U: UserContext>(&self, user: &U, participants: Participants) -> QmsResult<()> {
        let draft = ApprovalHierarchy::draft(
            0,
            0,
            participants.initiator_id,
            participants.checker_id,
            participants.approver_id,
        );
        DocumentContract::new(user).validate_hierarchy(&draft)?;
        self.ensure_participant("checker_id", participants.checker_id).await?;
        self.ensure_participant("approver_id", participants.approver_id).await
    }

    #[instrument(skip(self, user, params), fields(user_id = user.id()))]
    pub async fn create<U: UserContext>(&self, user: &U, params: DocumentParams) -> QmsResult<DocumentDetail> {
        let document = Document {
            title: params.title.trim().to_string(),
            document_number: params.document_number.trim().to_string(),
            department_id: params.department_id.or(user.department_id()),
            owner_id: user.id(),
            ..Default::default()
        };
        DocumentContract::new(user).validate(&document)?;

        let participants = Participants {
            initiator_id: user.id(),
            checker_id: params.checker_id,
            approver_id: params.approver_id,
        };
        self.check_participants(user, participants).await?;

        let revision = new_revision(params.file_path, params.file_name, params.change_summary, user.id())?;
        let detail = self
            .stores
            .documents
            .create_document(document, revision, participants)
            .await?;
        info!(document_id = ?detail.document.id, number = %detail.document.document_number, "document created");
        Ok(detail)
    }

    pub async fn get(&self, id: Id) -> QmsResult<DocumentView> {
        let document = self.load(id).await?;
        let revisions = self.stores.documents.revisions(id).await?;
        let hierarchy = self.stores.documents.current_hierarchy(id).await?;
        Ok(DocumentView {
            document,
            revisions,
            hierarchy,
        })
    }

    pub async fn list(&self, filter: &DocumentFilter, page: &PaginationParams) -> QmsResult<Page<Document>> {
        Ok(self.stores.documents.list_documents(filter, page).await?)
    }

    pub async fn revisions(&self, id: Id) -> QmsResult<Vec<DocumentRevision>> {
        self.load(id).await?;
        Ok(self.stores.documents.revisions(id).await?)
    }

    /// Initiator hands the draft to the checker
    #[instrument(skip(self, user), fields(user_id = user.id()))]
    pub async fn submit<U: UserContext>(&self, user: &U, id: Id) -> QmsResult<ApprovalHierarchy> {
        self.advance(user, id, ApprovalRole::Initiator, HierarchyStatus::PendingChecker, None)
            .await
    }

    /// Checker signs off and hands over to the approver
    #[instrument(skip(self, user), fields(user_id = user.id()))]
    pub async fn check<U: UserContext>(&self, user: &U, id: Id) -> QmsResult<ApprovalHierarchy> {
        self.advance(user, id, ApprovalRole::Checker, HierarchyStatus::PendingApproval, None)
            .await
    }

    #[instrument(skip(self, user), fields(user_id = user.id()))]
    pub async fn approve<U: UserContext>(&self, user: &U, id: Id) -> QmsResult<ApprovalHierarchy> {
        self.advance(user, id, ApprovalRole::Approver, HierarchyStatus::Approved, None)
            .await
    }

    /// Rejection by whoever the revision is waiting on
    #[instrument(skip(self, user, reason), fields(user_id = user.id()))]
    pub async fn reject<U: UserContext>(&self, user: &U, id: Id, reason: String) -> QmsResult<ApprovalHierarchy> {
        if reason.trim().is_empty() {
            return Err(QmsError::invalid("reason", "can't be blank"));
        }
        let hierarchy = self.load_hierarchy(id).await?;
        let role = match hierarchy.status {
            HierarchyStatus::PendingChecker => ApprovalRole::Checker,
            HierarchyStatus::PendingApproval => ApprovalRole::Approver,
            status => {
                return Err(QmsError::invalid_transition(format!(
                    "a {status} revision cannot be rejected"
                )))
            }
        };
        self.advance(user, id, role, HierarchyStatus::Rejected, Some(reason))
            .await
    }

    async fn advance<U: UserContext>(
        &self,
        user: &U,
        id: Id,
        role: ApprovalRole,
        to: HierarchyStatus,
        reason: Option<String>,
    ) -> QmsResult<ApprovalHierarchy> {
        let document = self.load(id).await?;
        let current = self.load_hierarchy(id).await?;
        let from = current.status;

        if !from.can_advance_to(to) {
            return Err(QmsError::invalid_transition(format!(
                "cannot move a {from} revision to {to}"
            )));
        }
        if !current.roles_of(user.id()).contains(&role) {
            return Err(QmsError::forbidden(format!("only the {role} can do this now")));
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.status = to;
        match (role, to) {
            (_, HierarchyStatus::Rejected) => {
                next.rejection_reason = reason;
                next.rejected_by = Some(user.id());
            }
            (ApprovalRole::Initiator, _) => {
                next.initiator_approved = true;
                next.initiator_approved_at = Some(now);
            }
            (ApprovalRole::Checker, _) => {
                next.checker_approved = true;
                next.checker_approved_at = Some(now);
            }
            (ApprovalRole::Approver, _) => {
                next.approver_approved = true;
                next.approver_approved_at = Some(now);
            }
        }

        let saved = self.stores.documents.save_transition(&next, from).await?;
        info!(document_id = id, from = %from, to = %to, "document hierarchy advanced");

        self.notify(&document, &saved).await;
        Ok(saved)
    }

    /// Start a new revision; refused while the current one is still in sign-off
    #[instrument(skip(self, user, params), fields(user_id = user.id()))]
    pub async fn add_revision<U: UserContext>(
        &self,
        user: &U,
        id: Id,
        params: RevisionParams,
    ) -> QmsResult<DocumentDetail> {
        let document = self.load(id).await?;
        if !DocumentContract::new(user).can_manage(&document) {
            return Err(QmsError::forbidden("you cannot revise this document"));
        }

        let previous = self.load_hierarchy(id).await?;
        if !previous.status.is_terminal() {
            return Err(QmsError::conflict(format!(
                "current revision is still {}",
                previous.status
            )));
        }

        let participants = Participants {
            initiator_id: user.id(),
            checker_id: params.checker_id.unwrap_or(previous.checker_id),
            approver_id: params.approver_id.unwrap_or(previous.approver_id),
        };
        self.check_participants(user, participants).await?;

        let revision = new_revision(params.file_path, params.file_name, params.change_summary, user.id())?;
        let detail = self.stores.documents.add_revision(id, revision, participants).await?;
        info!(
            document_id = id,
            revision = detail.revision.revision_number,
            "document revision added"
        );
        Ok(detail)
    }

    async fn notify(&self, document: &Document, hierarchy: &ApprovalHierarchy) {
        let revision_number = match self.stores.documents.revisions(hierarchy.document_id).await {
            Ok(revisions) => revisions
                .iter()
                .find(|r| r.id == Some(hierarchy.revision_id))
                .map_or(0, |r| r.revision_number),
            Err(e) => {
                warn!(error = %e, "revision lookup failed");
                return;
            }
        };

        let recipient = hierarchy.next_actor().unwrap_or(hierarchy.initiator_id);
        let member = match self.stores.members.find_by_id(recipient).await {
            Ok(Some(member)) => member,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, member_id = recipient, "recipient lookup failed");
                return;
            }
        };

        let templates = self.mailer.templates();
        let message = if hierarchy.status.is_terminal() {
            templates.document_decided(
                &member.email,
                document,
                revision_number,
                hierarchy.status,
                hierarchy.rejection_reason.as_deref(),
            )
        } else {
            templates.document_action_required(&member.email, document, revision_number, hierarchy.status)
        };
        self.mailer.notify(&message).await;
    }
}
