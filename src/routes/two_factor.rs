use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::clients::identity::OtpInfo;
use crate::error::AppResult;
use crate::state::AppState;
use crate::workflows::two_factor;

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct OtpSetupRequest {
    pub otp: String,
    pub secret: String,
}

pub async fn get_otp_info(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<OtpInfo>> {
    Ok(Json(two_factor::otp_info(&state, &user).await?))
}

pub async fn start_email_setup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(payload) = payload?;
    two_factor::start_email_setup(&state, &user, &payload.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn finish_email_setup(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(tan) = path?;
    two_factor::finish_email_setup(&state, &user, &tan).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn activate_app_otp(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<OtpSetupRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let Json(payload) = payload?;
    two_factor::activate_app_otp(&state, &user, &payload.otp, &payload.secret).await?;
    Ok(StatusCode::OK)
}

pub async fn deactivate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    two_factor::deactivate(&state, &user).await?;
    Ok(StatusCode::OK)
}
