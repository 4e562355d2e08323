use axum::http::StatusCode;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{authorize, AuthenticatedUser, Authority},
    clients::messaging::RcCredentials,
    error::{AppError, AppResult},
    models::{Chat, NewChat, NewChatAgency, NewChatUser, CHAT_INTERVAL_WEEKLY},
    schema::{chat_agency, chat_user, chats},
    state::AppState,
};

use super::membership::ChatMembershipReconciler;
use super::{active_consultant, active_user, consultant_agency_ids, user_agency_ids};

const MAX_TOPIC_LENGTH: usize = 255;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub topic: String,
    pub start_date: String,
    pub start_time: String,
    pub duration: i32,
    pub repetitive: bool,
    #[serde(default)]
    pub max_participants: Option<i32>,
    #[serde(default)]
    pub consulting_type: Option<i32>,
}

/// Validated form of a [`ChatRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSchedule {
    pub topic: String,
    pub start: NaiveDateTime,
    pub duration: i32,
    pub repetitive: bool,
    pub max_participants: Option<i32>,
    pub consulting_type: i32,
}

impl ChatRequest {
    pub fn validate(&self) -> AppResult<ChatSchedule> {
        let topic = self.topic.trim();
        if topic.is_empty() || topic.chars().count() > MAX_TOPIC_LENGTH {
            return Err(AppError::bad_request("topic must contain 1 to 255 characters"));
        }
        if self.duration <= 0 {
            return Err(AppError::bad_request("duration must be positive"));
        }
        if matches!(self.max_participants, Some(max) if max < 1) {
            return Err(AppError::bad_request("maxParticipants must be positive"));
        }
        let start = parse_schedule(&self.start_date, &self.start_time)
            .ok_or_else(|| AppError::bad_request("invalid startDate or startTime"))?;

        Ok(ChatSchedule {
            topic: topic.to_string(),
            start,
            duration: self.duration,
            repetitive: self.repetitive,
            max_participants: self.max_participants,
            consulting_type: self.consulting_type.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLinkResponse {
    pub group_id: Option<String>,
    pub chat_link: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    pub id: i64,
    pub topic: String,
    pub start_date: String,
    pub start_time: String,
    pub duration: i32,
    pub repetitive: bool,
    pub interval: Option<String>,
    pub active: bool,
    pub max_participants: Option<i32>,
    pub consulting_type: i32,
    pub group_id: Option<String>,
    pub banned_users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatMember {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

pub fn parse_schedule(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .ok()?;
    Some(date.and_time(time))
}

/// Start of the next occurrence, or `None` when the chat does not repeat on
/// a known interval.
pub fn next_start(chat: &Chat) -> Option<NaiveDateTime> {
    if !chat.is_repetitive {
        return None;
    }
    match chat.chat_interval.as_deref() {
        Some(CHAT_INTERVAL_WEEKLY) => Some(chat.start_date + Duration::weeks(1)),
        _ => None,
    }
}

pub fn group_name(chat_id: i64, start: NaiveDateTime) -> String {
    format!("{}_group_chat_{}", chat_id, start.format("%Y%m%d%H%M"))
}

pub fn chat_link(base_url: &str, consulting_type: i32, chat_id: i64) -> String {
    format!("{base_url}/{consulting_type}/{chat_id}")
}

fn find_chat(conn: &mut PgConnection, chat_id: i64) -> QueryResult<Option<Chat>> {
    chats::table.find(chat_id).first(conn).optional()
}

fn chat_agency_ids(conn: &mut PgConnection, chat_id: i64) -> QueryResult<Vec<i64>> {
    chat_agency::table
        .filter(chat_agency::chat_id.eq(chat_id))
        .select(chat_agency::agency_id)
        .load(conn)
}

fn shares_agency(chat_agencies: &[i64], own_agencies: &[i64]) -> bool {
    own_agencies.iter().any(|agency| chat_agencies.contains(agency))
}

fn require_group(chat: &Chat) -> AppResult<&str> {
    chat.group_id
        .as_deref()
        .ok_or_else(|| AppError::internal(format!("chat {} has no messaging group", chat.id)))
}

struct ChatAccess {
    rc_user_id: Option<String>,
    advice_seeker: bool,
}

impl ChatAccess {
    fn rc_user_id(&self, caller: &AuthenticatedUser) -> AppResult<&str> {
        self.rc_user_id.as_deref().ok_or_else(|| {
            AppError::internal(format!("user {} has no messaging id", caller.user_id))
        })
    }
}

/// Consultants need a shared agency through their agency links, askers
/// through their registrations.
fn check_chat_access(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    chat: &Chat,
) -> AppResult<ChatAccess> {
    authorize(caller, &[Authority::UserDefault, Authority::ConsultantDefault])?;
    let chat_agencies = chat_agency_ids(conn, chat.id)?;

    if caller.is_consultant() {
        let consultant = active_consultant(conn, caller.user_id)?.ok_or_else(|| {
            AppError::internal(format!("consultant {} not found", caller.user_id))
        })?;
        if !shares_agency(&chat_agencies, &consultant_agency_ids(conn, consultant.id)?) {
            return Err(AppError::forbidden(format!(
                "consultant {} has no permission for chat {}",
                consultant.id, chat.id
            )));
        }
        return Ok(ChatAccess {
            rc_user_id: consultant.rc_user_id,
            advice_seeker: false,
        });
    }

    let user = active_user(conn, caller.user_id)?
        .ok_or_else(|| AppError::internal(format!("user {} not found", caller.user_id)))?;
    if !shares_agency(&chat_agencies, &user_agency_ids(conn, user.id)?) {
        return Err(AppError::forbidden(format!(
            "user {} has no permission for chat {}",
            user.id, chat.id
        )));
    }
    Ok(ChatAccess {
        rc_user_id: user.rc_user_id,
        advice_seeker: true,
    })
}

/// Loads the calling consultant and checks that they share an agency with the chat.
fn owning_agency_consultant_rc_id(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    chat: &Chat,
) -> AppResult<String> {
    let consultant = active_consultant(conn, caller.user_id)?
        .ok_or_else(|| AppError::internal(format!("consultant {} not found", caller.user_id)))?;
    let chat_agencies = chat_agency_ids(conn, chat.id)?;
    if !shares_agency(&chat_agencies, &consultant_agency_ids(conn, consultant.id)?) {
        return Err(AppError::forbidden(format!(
            "consultant {} has no permission for chat {}",
            consultant.id, chat.id
        )));
    }
    consultant
        .rc_user_id
        .ok_or_else(|| AppError::internal(format!("consultant {} has no messaging id", consultant.id)))
}

async fn create_group_with_technical_user(state: &AppState, name: &str) -> AppResult<String> {
    let group_id = state.messaging.create_private_group(name).await?;
    if let Err(err) = state
        .messaging
        .add_user_to_group(state.technical_user_id(), &group_id)
        .await
    {
        discard_group(state, &group_id).await;
        return Err(err.into());
    }
    Ok(group_id)
}

pub async fn create_chat(
    state: &AppState,
    caller: &AuthenticatedUser,
    request: ChatRequest,
) -> AppResult<ChatLinkResponse> {
    authorize(caller, &[Authority::CreateNewChat])?;
    let schedule = request.validate()?;

    let chat = {
        let mut conn = state.db()?;
        let consultant = active_consultant(&mut conn, caller.user_id)?.ok_or_else(|| {
            AppError::internal(format!("consultant {} not found", caller.user_id))
        })?;
        let agency_id = consultant_agency_ids(&mut conn, consultant.id)?
            .first()
            .copied()
            .ok_or_else(|| {
                AppError::internal(format!(
                    "consultant {} is not assigned to any agency",
                    consultant.id
                ))
            })?;

        let new_chat = NewChat {
            topic: schedule.topic.clone(),
            consulting_type_id: schedule.consulting_type,
            initial_start_date: schedule.start,
            start_date: schedule.start,
            duration: schedule.duration,
            is_repetitive: schedule.repetitive,
            chat_interval: schedule
                .repetitive
                .then(|| CHAT_INTERVAL_WEEKLY.to_string()),
            is_active: false,
            max_participants: schedule.max_participants,
            group_id: None,
            consultant_id_owner: consultant.id,
        };
        conn.transaction::<Chat, DieselError, _>(|conn| {
            let chat: Chat = diesel::insert_into(chats::table)
                .values(&new_chat)
                .get_result(conn)?;
            diesel::insert_into(chat_agency::table)
                .values(&NewChatAgency {
                    chat_id: chat.id,
                    agency_id,
                })
                .execute(conn)?;
            Ok(chat)
        })?
    };

    let group_id = match create_group_with_technical_user(
        state,
        &group_name(chat.id, chat.start_date),
    )
    .await
    {
        Ok(group_id) => group_id,
        Err(err) => {
            let mut conn = state.db()?;
            diesel::delete(chats::table.find(chat.id)).execute(&mut conn)?;
            return Err(err);
        }
    };

    let stored = {
        let mut conn = state.db()?;
        diesel::update(chats::table.find(chat.id))
            .set(chats::group_id.eq(Some(group_id.clone())))
            .execute(&mut conn)
    };
    if let Err(err) = stored {
        discard_group(state, &group_id).await;
        let mut conn = state.db()?;
        diesel::delete(chats::table.find(chat.id)).execute(&mut conn)?;
        return Err(err.into());
    }

    info!(chat_id = chat.id, group_id = %group_id, "created chat");
    Ok(ChatLinkResponse {
        group_id: Some(group_id),
        chat_link: chat_link(
            &state.config.chat_link_base_url,
            chat.consulting_type_id,
            chat.id,
        ),
    })
}

pub async fn get_chat(
    state: &AppState,
    caller: &AuthenticatedUser,
    chat_id: i64,
) -> AppResult<ChatInfo> {
    let chat = {
        let mut conn = state.db()?;
        let chat = find_chat(&mut conn, chat_id)?.ok_or_else(AppError::not_found)?;
        check_chat_access(&mut conn, caller, &chat)?;
        chat
    };

    let banned_users = match chat.group_id.as_deref() {
        Some(group_id) => state.messaging.room_info(group_id).await?.muted,
        None => Vec::new(),
    };

    Ok(ChatInfo {
        id: chat.id,
        topic: chat.topic,
        start_date: chat.start_date.format("%Y-%m-%d").to_string(),
        start_time: chat.start_date.format("%H:%M").to_string(),
        duration: chat.duration,
        repetitive: chat.is_repetitive,
        interval: chat.chat_interval,
        active: chat.is_active,
        max_participants: chat.max_participants,
        consulting_type: chat.consulting_type_id,
        group_id: chat.group_id,
        banned_users,
    })
}

pub async fn start_chat(state: &AppState, caller: &AuthenticatedUser, chat_id: i64) -> AppResult<()> {
    authorize(caller, &[Authority::StartChat])?;

    let (chat, rc_user_id) = {
        let mut conn = state.db()?;
        let chat = find_chat(&mut conn, chat_id)?
            .ok_or_else(|| AppError::bad_request(format!("chat {chat_id} does not exist")))?;
        if chat.is_active {
            return Err(AppError::bad_request(format!("chat {chat_id} is already active")));
        }
        let rc_user_id = owning_agency_consultant_rc_id(&mut conn, caller, &chat)?;
        (chat, rc_user_id)
    };

    let group_id = require_group(&chat)?;
    state.messaging.add_user_to_group(&rc_user_id, group_id).await?;

    let mut conn = state.db()?;
    diesel::update(chats::table.find(chat.id))
        .set((
            chats::is_active.eq(true),
            chats::update_date.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    info!(chat_id, "started chat");
    Ok(())
}

fn load_active_chat_with_access(
    conn: &mut PgConnection,
    caller: &AuthenticatedUser,
    chat_id: i64,
) -> AppResult<(Chat, ChatAccess)> {
    let chat = find_chat(conn, chat_id)?.ok_or_else(AppError::not_found)?;
    if !chat.is_active {
        return Err(AppError::conflict(format!("chat {chat_id} has not been started")));
    }
    let access = check_chat_access(conn, caller, &chat)?;
    Ok((chat, access))
}

pub async fn join_chat(state: &AppState, caller: &AuthenticatedUser, chat_id: i64) -> AppResult<()> {
    let (chat, access) = {
        let mut conn = state.db()?;
        load_active_chat_with_access(&mut conn, caller, chat_id)?
    };
    let rc_user_id = access.rc_user_id(caller)?;
    let group_id = require_group(&chat)?;

    if ChatMembershipReconciler::new(state)
        .is_member(group_id, rc_user_id)
        .await?
    {
        return Err(AppError::conflict(format!("already joined chat {chat_id}")));
    }
    state.messaging.add_user_to_group(rc_user_id, group_id).await?;

    if access.advice_seeker {
        let mut conn = state.db()?;
        diesel::insert_into(chat_user::table)
            .values(&NewChatUser {
                chat_id: chat.id,
                user_id: caller.user_id,
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
    }
    info!(chat_id, user_id = %caller.user_id, "joined chat");
    Ok(())
}

pub async fn leave_chat(state: &AppState, caller: &AuthenticatedUser, chat_id: i64) -> AppResult<()> {
    let (chat, access) = {
        let mut conn = state.db()?;
        load_active_chat_with_access(&mut conn, caller, chat_id)?
    };
    let rc_user_id = access.rc_user_id(caller)?;
    let group_id = require_group(&chat)?;

    state
        .messaging
        .remove_user_from_group(rc_user_id, group_id)
        .await?;
    if access.advice_seeker {
        let mut conn = state.db()?;
        diesel::delete(
            chat_user::table
                .filter(chat_user::chat_id.eq(chat.id))
                .filter(chat_user::user_id.eq(caller.user_id)),
        )
        .execute(&mut conn)?;
    }
    info!(chat_id, user_id = %caller.user_id, "left chat");

    if !ChatMembershipReconciler::new(state)
        .has_real_members(group_id)
        .await?
    {
        info!(chat_id, "last member left, stopping chat");
        stop_active_chat(state, &chat).await?;
    }
    Ok(())
}

pub async fn stop_chat(state: &AppState, caller: &AuthenticatedUser, chat_id: i64) -> AppResult<()> {
    authorize(caller, &[Authority::StopChat])?;

    let chat = {
        let mut conn = state.db()?;
        let chat = find_chat(&mut conn, chat_id)?
            .ok_or_else(|| AppError::bad_request(format!("chat {chat_id} does not exist")))?;
        owning_agency_consultant_rc_id(&mut conn, caller, &chat)?;
        chat
    };
    if !chat.is_active {
        return Err(AppError::conflict(format!("chat {chat_id} is already stopped")));
    }
    stop_active_chat(state, &chat).await
}

/// Deletes the room of an active chat. Repetitive chats move to their next
/// occurrence with a fresh room, one time chats are removed.
///
/// The successor room of a repetitive chat exists before the old room is
/// deleted, so a failing messaging backend leaves the chat on its old room.
async fn stop_active_chat(state: &AppState, chat: &Chat) -> AppResult<()> {
    let group_id = require_group(chat)?;
    if !chat.is_repetitive {
        close_room(state, chat.id, group_id).await?;
        let mut conn = state.db()?;
        diesel::delete(chats::table.find(chat.id)).execute(&mut conn)?;
        info!(chat_id = chat.id, "deleted one time chat");
        return Ok(());
    }

    let start = next_start(chat).ok_or_else(|| {
        AppError::internal(format!("chat {} has an unsupported interval", chat.id))
    })?;
    let new_group_id = create_group_with_technical_user(state, &group_name(chat.id, start)).await?;
    if let Err(err) = close_room(state, chat.id, group_id).await {
        discard_group(state, &new_group_id).await;
        return Err(err);
    }

    let mut conn = state.db()?;
    diesel::update(chats::table.find(chat.id))
        .set((
            chats::group_id.eq(Some(new_group_id.clone())),
            chats::start_date.eq(start),
            chats::is_active.eq(false),
            chats::update_date.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)
        .map_err(|err| {
            error!(chat_id = chat.id, group_id = %new_group_id, error = %err, "failed to store successor room");
            err
        })?;
    info!(chat_id = chat.id, group_id = %new_group_id, next_start = %start, "rescheduled repetitive chat");
    Ok(())
}

/// Unmutes banned users and deletes the room.
async fn close_room(state: &AppState, chat_id: i64, group_id: &str) -> AppResult<()> {
    let muted = state.messaging.room_info(group_id).await?.muted;
    for username in &muted {
        if let Err(err) = state.messaging.unmute_user(username, group_id).await {
            warn!(chat_id, username = %username, error = %err, "failed to unmute user");
        }
    }
    state.messaging.delete_group(group_id).await?;
    Ok(())
}

async fn discard_group(state: &AppState, group_id: &str) {
    if let Err(err) = state.messaging.delete_group(group_id).await {
        warn!(group_id = %group_id, error = %err, "failed to delete unused group");
    }
}

pub async fn update_chat(
    state: &AppState,
    caller: &AuthenticatedUser,
    chat_id: i64,
    request: ChatRequest,
) -> AppResult<ChatLinkResponse> {
    authorize(caller, &[Authority::UpdateChat])?;

    let mut conn = state.db()?;
    let chat = find_chat(&mut conn, chat_id)?.ok_or_else(AppError::not_found)?;
    if chat.is_active {
        return Err(AppError::conflict(format!("chat {chat_id} is active and cannot be changed")));
    }
    if chat.consultant_id_owner != caller.user_id {
        return Err(AppError::forbidden(format!(
            "only the owner may change chat {chat_id}"
        )));
    }
    let schedule = request.validate()?;

    let updated: Chat = diesel::update(chats::table.find(chat_id))
        .set((
            chats::topic.eq(&schedule.topic),
            chats::initial_start_date.eq(schedule.start),
            chats::start_date.eq(schedule.start),
            chats::duration.eq(schedule.duration),
            chats::is_repetitive.eq(schedule.repetitive),
            chats::chat_interval.eq(schedule
                .repetitive
                .then(|| CHAT_INTERVAL_WEEKLY.to_string())),
            chats::max_participants.eq(schedule.max_participants),
            chats::update_date.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)?;
    info!(chat_id, "updated chat");

    Ok(ChatLinkResponse {
        chat_link: chat_link(
            &state.config.chat_link_base_url,
            updated.consulting_type_id,
            updated.id,
        ),
        group_id: updated.group_id,
    })
}

pub async fn chat_members(
    state: &AppState,
    caller: &AuthenticatedUser,
    chat_id: i64,
) -> AppResult<Vec<ChatMember>> {
    let (chat, _) = {
        let mut conn = state.db()?;
        load_active_chat_with_access(&mut conn, caller, chat_id)?
    };
    let group_id = require_group(&chat)?;

    let members = state.messaging.group_members(group_id).await?;
    Ok(members
        .into_iter()
        .filter(|member| {
            member.id != state.system_user_id() && member.id != state.technical_user_id()
        })
        .map(|member| ChatMember {
            id: member.id,
            username: member.username,
            name: member.name,
        })
        .collect())
}

/// Records that the calling asker belongs to the chat behind `group_id`.
pub async fn assign_chat(
    state: &AppState,
    caller: &AuthenticatedUser,
    group_id: &str,
) -> AppResult<()> {
    authorize(caller, &[Authority::UserDefault])?;

    let mut conn = state.db()?;
    let chat: Chat = chats::table
        .filter(chats::group_id.eq(group_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;
    let user = active_user(&mut conn, caller.user_id)?
        .ok_or_else(|| AppError::internal(format!("user {} not found", caller.user_id)))?;

    match diesel::insert_into(chat_user::table)
        .values(&NewChatUser {
            chat_id: chat.id,
            user_id: user.id,
        })
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::conflict(format!(
                "user {} is already assigned to chat {}",
                user.id, chat.id
            )));
        }
        Err(err) => return Err(AppError::from(err)),
    }
    info!(chat_id = chat.id, user_id = %user.id, "assigned asker to chat");
    Ok(())
}

/// Mutes an asker in a chat room on behalf of the calling consultant.
pub async fn ban_user(
    state: &AppState,
    caller: &AuthenticatedUser,
    rc_token: &str,
    chat_user_id: Uuid,
    chat_id: i64,
) -> AppResult<()> {
    authorize(caller, &[Authority::UpdateChat])?;

    let (caller_rc_user_id, target_rc_user_id, chat) = {
        let mut conn = state.db()?;
        let caller_rc_user_id = active_consultant(&mut conn, caller.user_id)?
            .and_then(|consultant| consultant.rc_user_id)
            .ok_or_else(|| {
                AppError::internal(format!("consultant {} has no messaging id", caller.user_id))
            })?;
        let target = active_user(&mut conn, chat_user_id)?.ok_or_else(AppError::not_found)?;
        let chat = find_chat(&mut conn, chat_id)?.ok_or_else(AppError::not_found)?;
        let target_rc_user_id = target.rc_user_id.ok_or_else(AppError::not_found)?;
        (caller_rc_user_id, target_rc_user_id, chat)
    };
    let group_id = chat.group_id.as_deref().ok_or_else(AppError::not_found)?;

    let username = state.messaging.username_of(&target_rc_user_id).await?;
    let credentials = RcCredentials {
        user_id: caller_rc_user_id,
        token: rc_token.to_string(),
    };
    let response = state
        .messaging
        .mute_user(&credentials, &username, group_id)
        .await?;

    if response.user_not_in_room() {
        return Err(AppError::new(
            StatusCode::NOT_FOUND,
            format!("user {chat_user_id} is not in chat {chat_id}"),
        ));
    }
    if !response.success {
        return Err(AppError::internal(format!(
            "muting user {chat_user_id} in chat {chat_id} failed: {}",
            response.message
        )));
    }
    info!(chat_id, user_id = %chat_user_id, "banned user from chat");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(repetitive: bool, interval: Option<&str>) -> Chat {
        let start = parse_schedule("2024-05-06", "18:30").unwrap();
        Chat {
            id: 7,
            topic: "Gruppenchat".into(),
            consulting_type_id: 15,
            initial_start_date: start,
            start_date: start,
            duration: 90,
            is_repetitive: repetitive,
            chat_interval: interval.map(str::to_string),
            is_active: true,
            max_participants: None,
            group_id: Some("room-7".into()),
            consultant_id_owner: Uuid::new_v4(),
            create_date: start,
            update_date: start,
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            topic: "  Wochenrunde ".into(),
            start_date: "2024-05-06".into(),
            start_time: "18:30".into(),
            duration: 60,
            repetitive: true,
            max_participants: Some(10),
            consulting_type: None,
        }
    }

    #[test]
    fn weekly_chat_moves_one_week_ahead() {
        let next = next_start(&chat(true, Some(CHAT_INTERVAL_WEEKLY))).unwrap();
        assert_eq!(next, parse_schedule("2024-05-13", "18:30").unwrap());
    }

    #[test]
    fn one_time_and_unknown_intervals_have_no_next_start() {
        assert!(next_start(&chat(false, None)).is_none());
        assert!(next_start(&chat(true, Some("MONTHLY"))).is_none());
    }

    #[test]
    fn parses_schedule_with_or_without_seconds() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();
        assert_eq!(parse_schedule("2024-05-06", "18:30"), Some(expected));
        assert_eq!(parse_schedule("2024-05-06", "18:30:00"), Some(expected));
        assert!(parse_schedule("06.05.2024", "18:30").is_none());
        assert!(parse_schedule("2024-05-06", "25:00").is_none());
    }

    #[test]
    fn group_name_contains_chat_id_and_start() {
        let start = parse_schedule("2024-05-13", "18:30").unwrap();
        assert_eq!(group_name(7, start), "7_group_chat_202405131830");
    }

    #[test]
    fn validation_trims_topic_and_defaults_consulting_type() {
        let schedule = request().validate().unwrap();
        assert_eq!(schedule.topic, "Wochenrunde");
        assert_eq!(schedule.consulting_type, 0);
        assert_eq!(schedule.max_participants, Some(10));
    }

    #[test]
    fn validation_rejects_bad_input() {
        let mut blank = request();
        blank.topic = "   ".into();
        assert!(blank.validate().is_err());

        let mut no_duration = request();
        no_duration.duration = 0;
        assert!(no_duration.validate().is_err());

        let mut bad_time = request();
        bad_time.start_time = "soon".into();
        assert!(bad_time.validate().is_err());
    }

    #[test]
    fn agency_overlap_is_required() {
        assert!(shares_agency(&[1, 2], &[2]));
        assert!(!shares_agency(&[1], &[3, 4]));
        assert!(!shares_agency(&[], &[1]));
    }
}
