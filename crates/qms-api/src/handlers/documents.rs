//! Controlled document handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use qms_core::traits::Id;
use qms_db::DocumentFilter;
use qms_models::HierarchyStatus;
use qms_services::{DocumentParams, RevisionParams};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{pagination, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListQuery {
    pub status: Option<HierarchyStatus>,
    pub department_id: Option<Id>,
    pub owner_id: Option<Id>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: String,
}

/// GET /api/v1/documents
pub async fn list_documents(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<DocumentListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = DocumentFilter {
        status: query.status,
        department_id: query.department_id,
        owner_id: query.owner_id,
    };
    let page = state
        .services
        .documents
        .list(&filter, &pagination(query.page, query.per_page))
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/documents
pub async fn create_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<DocumentParams>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.services.documents.create(&*user, params).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/v1/documents/:id
pub async fn get_document(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.documents.get(id).await?))
}

/// GET /api/v1/documents/:id/revisions
pub async fn list_revisions(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.documents.revisions(id).await?))
}

/// POST /api/v1/documents/:id/revisions
pub async fn add_revision(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(params): Json<RevisionParams>,
) -> ApiResult<impl IntoResponse> {
    let detail = state.services.documents.add_revision(&*user, id, params).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// POST /api/v1/documents/:id/submit
pub async fn submit_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.documents.submit(&*user, id).await?))
}

/// POST /api/v1/documents/:id/check
pub async fn check_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.documents.check(&*user, id).await?))
}

/// POST /api/v1/documents/:id/approve
pub async fn approve_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.documents.approve(&*user, id).await?))
}

/// POST /api/v1/documents/:id/reject
pub async fn reject_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<RejectBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.documents.reject(&*user, id, body.reason).await?))
}
