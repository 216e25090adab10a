//! Task API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use qms_core::traits::Id;
use qms_db::{TaskChanges, TaskFilter};
use qms_models::{TaskPriority, TaskStatus};
use qms_services::TaskParams;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::{pagination, AppState, AuthenticatedUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub department_id: Option<Id>,
    pub assignee_id: Option<Id>,
    #[serde(default)]
    pub overdue_only: bool,
    #[serde(default)]
    pub include_templates: bool,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdateBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub department_id: Option<Id>,
    pub assignee_id: Option<Id>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub approver_id: Option<Id>,
}

impl From<TaskUpdateBody> for TaskChanges {
    fn from(body: TaskUpdateBody) -> Self {
        TaskChanges {
            title: body.title,
            description: body.description,
            department_id: body.department_id,
            assignee_id: body.assignee_id,
            priority: body.priority,
            due_date: body.due_date,
            start_date: body.start_date,
            end_date: body.end_date,
            approver_id: body.approver_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: TaskStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// GET /api/v1/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = TaskFilter {
        status: query.status,
        department_id: query.department_id,
        assignee_id: query.assignee_id,
        parent_task_id: None,
        overdue_only: query.overdue_only,
        include_templates: query.include_templates,
    };
    let page = state
        .services
        .tasks
        .list(&filter, &pagination(query.page, query.per_page))
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/tasks
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<TaskParams>,
) -> ApiResult<impl IntoResponse> {
    let created = state.services.tasks.create(&*user, params).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/tasks/:id
pub async fn get_task(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.tasks.get(id).await?))
}

/// PATCH /api/v1/tasks/:id
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<TaskUpdateBody>,
) -> ApiResult<impl IntoResponse> {
    let task = state.services.tasks.update(&*user, id, body.into()).await?;
    Ok(Json(task))
}

/// DELETE /api/v1/tasks/:id
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    state.services.tasks.delete(&*user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/tasks/:id/status
pub async fn set_task_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<StatusBody>,
) -> ApiResult<impl IntoResponse> {
    let change = state.services.tasks.set_status(&*user, id, body.status).await?;
    Ok(Json(change))
}

/// POST /api/v1/tasks/:id/approve
pub async fn approve_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    body: Option<Json<DecisionBody>>,
) -> ApiResult<impl IntoResponse> {
    let reason = body.and_then(|Json(b)| b.reason);
    Ok(Json(state.services.tasks.approve(&*user, id, reason).await?))
}

/// POST /api/v1/tasks/:id/reject
pub async fn reject_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Id>,
    Json(body): Json<DecisionBody>,
) -> ApiResult<impl IntoResponse> {
    let reason = body.reason.unwrap_or_default();
    Ok(Json(state.services.tasks.reject(&*user, id, reason).await?))
}

/// GET /api/v1/tasks/:id/instances
pub async fn list_task_instances(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<Id>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.tasks.instances(id).await?))
}
