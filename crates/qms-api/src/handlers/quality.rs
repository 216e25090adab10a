//! Audit and non-conformance handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use qms_core::traits::Id;
use qms_db::{AuditFilter, NcFilter};
use qms_models::{AuditStatus, NcStatus, Severity};
use qms_services::{AuditParams, AuditUpdate, NcAdvance, NcParams, NcUpdate};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{pagination, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditListQuery {
    pub status: Option<AuditStatus>,
    pub department_id: Option<Id>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NcListQuery {
    pub status: Option<NcStatus>,
    pub severity: Option<Severity>,
    pub department_id: Option<Id>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// GET /api/v1/audits
pub async fn list_audits(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<AuditListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = AuditFilter {
        status: query.status,
        department_id: query.department_id,
    };
    let page = state
        .services
        .audits
        .list(&filter, &pagination(query.page, query.per_page))
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/audits
pub async fn create_audit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<AuditParams>,
) -> ApiResult<impl IntoResponse> {
    let audit = state.services.audits.create(&user, params).await?;
    Ok((StatusCode::CREATED, Json(audit)))
}

/// GET /api/v1/audits/:id
pub async fn get_audit(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.audits.get(id).await?))
}

/// PATCH /api/v1/audits/:id
pub async fn update_audit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(update): Json<AuditUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.audits.update(&user, id, update).await?))
}

/// GET /api/v1/non-conformances
pub async fn list_non_conformances(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<NcListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = NcFilter {
        status: query.status,
        severity: query.severity,
        department_id: query.department_id,
    };
    let page = state
        .services
        .non_conformances
        .list(&filter, &pagination(query.page, query.per_page))
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/non-conformances
pub async fn create_non_conformance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<NcParams>,
) -> ApiResult<impl IntoResponse> {
    let nc = state.services.non_conformances.create(&user, params).await?;
    Ok((StatusCode::CREATED, Json(nc)))
}

/// GET /api/v1/non-conformances/:id
pub async fn get_non_conformance(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.non_conformances.get(id).await?))
}

/// PATCH /api/v1/non-conformances/:id
pub async fn update_non_conformance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(update): Json<NcUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.non_conformances.update(&user, id, update).await?))
}

/// POST /api/v1/non-conformances/:id/advance
pub async fn advance_non_conformance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(advance): Json<NcAdvance>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.non_conformances.advance(&user, id, advance).await?))
}
