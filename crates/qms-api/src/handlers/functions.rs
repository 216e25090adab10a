//! Function endpoints under `/functions/v1`
//!
//! These are the operational entry points used by the web client and
//! schedulers: outbound e-mail, reporting, HR sync, the automation sweep and
//! admin bootstrap.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use qms_db::{PoolStats, TableCount};
use qms_services::{CreateAdminParams, InvitationParams, SendEmailParams, SyncAction};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::extractors::{AppState, AuthenticatedUser};

/// Header carrying the bootstrap secret for `create-admin`
pub const SETUP_TOKEN_HEADER: &str = "x-setup-token";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentResponse {
    pub message_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardReportBody {
    #[serde(default)]
    pub recipients: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HrOneBody {
    #[serde(default)]
    pub action: SyncAction,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUtilsResponse {
    pub tables: Vec<TableCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolStats>,
}

/// POST /functions/v1/send-email
pub async fn send_email(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<SendEmailParams>,
) -> ApiResult<impl IntoResponse> {
    let message_id = state.services.mailer.send_custom(&*user, params).await?;
    Ok(Json(SentResponse { message_id }))
}

/// POST /functions/v1/send-invitation
pub async fn send_invitation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(params): Json<InvitationParams>,
) -> ApiResult<impl IntoResponse> {
    let member = state.services.invitations.invite(&user, params).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// POST /functions/v1/send-dashboard-report
pub async fn send_dashboard_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<DashboardReportBody>>,
) -> ApiResult<impl IntoResponse> {
    user.require_manager()?;
    let recipients = body.and_then(|Json(b)| b.recipients);
    let today = Utc::now().date_naive();
    Ok(Json(state.services.reports.send(today, recipients).await?))
}

/// POST /functions/v1/hrone-integration
pub async fn hrone_integration(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Option<Json<HrOneBody>>,
) -> ApiResult<impl IntoResponse> {
    let action = body.map(|Json(b)| b.action).unwrap_or_default();
    Ok(Json(state.services.hr_sync.run(&user, action).await?))
}

/// POST /functions/v1/task-automation
pub async fn task_automation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    user.require_manager()?;
    let report = state.services.automation.run(Utc::now().date_naive()).await?;
    info!(user_id = user.id, ?report, "automation sweep triggered");
    Ok(Json(report))
}

/// GET /functions/v1/database-utils
pub async fn database_utils(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<impl IntoResponse> {
    user.require_admin()?;
    let tables = state.services.reports.table_counts().await?;
    let pool = state.database.as_ref().map(|db| db.stats());
    Ok(Json(DatabaseUtilsResponse { tables, pool }))
}

/// POST /functions/v1/create-admin
pub async fn create_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<CreateAdminParams>,
) -> ApiResult<impl IntoResponse> {
    let token = headers
        .get(SETUP_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let admin = state.services.admin.create_admin(token, params).await?;
    Ok((StatusCode::CREATED, Json(admin)))
}
