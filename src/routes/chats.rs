use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::workflows::chat::{self, ChatInfo, ChatLinkResponse, ChatMember, ChatRequest};

const RC_TOKEN_HEADER: &str = "rcToken";

#[derive(Serialize)]
pub struct ChatMembersResponse {
    pub members: Vec<ChatMember>,
}

pub async fn create_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ChatLinkResponse>)> {
    let Json(payload) = payload?;
    let created = chat::create_chat(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<ChatInfo>> {
    let Path(chat_id) = path?;
    Ok(Json(chat::get_chat(&state, &user, chat_id).await?))
}

pub async fn start_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(chat_id) = path?;
    chat::start_chat(&state, &user, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(chat_id) = path?;
    chat::join_chat(&state, &user, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(chat_id) = path?;
    chat::leave_chat(&state, &user, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stop_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(chat_id) = path?;
    chat::stop_chat(&state, &user, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn chat_members(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<Json<ChatMembersResponse>> {
    let Path(chat_id) = path?;
    let members = chat::chat_members(&state, &user, chat_id).await?;
    Ok(Json(ChatMembersResponse { members }))
}

pub async fn update_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> AppResult<Json<ChatLinkResponse>> {
    let Path(chat_id) = path?;
    let Json(payload) = payload?;
    Ok(Json(chat::update_chat(&state, &user, chat_id, payload).await?))
}

pub async fn assign_chat(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<String>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(group_id) = path?;
    chat::assign_chat(&state, &user, &group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ban_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<(Uuid, i64)>, PathRejection>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let Path((chat_user_id, chat_id)) = path?;
    let rc_token = headers
        .get(RC_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::bad_request("missing rcToken header"))?;
    chat::ban_user(&state, &user, rc_token, chat_user_id, chat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
