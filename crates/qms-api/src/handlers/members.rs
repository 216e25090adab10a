//! Team member and department handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use qms_core::traits::Id;
use qms_db::MemberFilter;
use qms_models::{MemberRole, MemberStatus};
use qms_services::{DepartmentParams, MemberUpdate};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{pagination, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListQuery {
    pub role: Option<MemberRole>,
    pub status: Option<MemberStatus>,
    pub department_id: Option<Id>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// GET /api/v1/team-members
pub async fn list_members(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<MemberListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = MemberFilter {
        role: query.role,
        status: query.status,
        department_id: query.department_id,
    };
    let page = state
        .services
        .members
        .list(&filter, &pagination(query.page, query.per_page))
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/team-members/:id
pub async fn get_member(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.members.get(id).await?))
}

/// PATCH /api/v1/team-members/:id
pub async fn update_member(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(update): Json<MemberUpdate>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.members.update(&user, id, update).await?))
}

/// GET /api/v1/departments
pub async fn list_departments(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.departments.list().await?))
}

/// POST /api/v1/departments
pub async fn create_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<DepartmentParams>,
) -> ApiResult<impl IntoResponse> {
    let department = state.services.departments.create(&user, params).await?;
    Ok((StatusCode::CREATED, Json(department)))
}

/// PATCH /api/v1/departments/:id
pub async fn update_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(params): Json<DepartmentParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.departments.update(&user, id, params).await?))
}

/// DELETE /api/v1/departments/:id
pub async fn delete_department(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.departments.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
