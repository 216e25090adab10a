//! One-time code login handlers

use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::AppState;

#[derive(Debug, Deserialize)]
pub struct OtpRequestBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyBody {
    pub email: String,
    pub code: String,
}

/// POST /api/v1/auth/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpRequestBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.otp.request_code(&body.email).await?))
}

/// POST /api/v1/auth/otp/verify
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpVerifyBody>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.services.otp.verify(&body.email, &body.code).await?))
}
