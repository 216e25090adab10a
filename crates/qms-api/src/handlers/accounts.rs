//! Signup and account approval handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use qms_core::traits::Id;
use qms_models::AccountApprovalStatus;
use qms_services::SignupParams;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{pagination, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalListQuery {
    pub status: Option<AccountApprovalStatus>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/v1/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(params): Json<SignupParams>,
) -> ApiResult<impl IntoResponse> {
    let request = state.services.accounts.signup(params).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/account-approvals
pub async fn list_approvals(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ApprovalListQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .services
        .accounts
        .list(&user, query.status, &pagination(query.page, query.per_page))
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/account-approvals/:id/approve
pub async fn approve_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.accounts.approve(&user, id).await?))
}

/// POST /api/v1/account-approvals/:id/reject
pub async fn reject_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    body: Option<Json<RejectBody>>,
) -> ApiResult<impl IntoResponse> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(state.services.accounts.reject(&user, id, reason).await?))
}
