use std::collections::HashMap;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{authorize, AuthenticatedUser, Authority};
use crate::error::{AppError, AppResult};
use crate::models::{Consultant, Session, SessionStatus, User};
use crate::schema::{consultants, sessions, users};
use crate::state::AppState;
use crate::workflows::{assignment, consultant_agency_ids};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionItem {
    pub id: i64,
    pub agency_id: i64,
    pub consulting_type: i32,
    pub status: i32,
    pub postcode: String,
    pub language: String,
    pub registration_type: String,
    pub group_id: Option<String>,
    pub feedback_group_id: Option<String>,
    pub is_team_session: bool,
    pub asker_username: Option<String>,
    pub consultant: Option<SessionConsultant>,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConsultant {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub absent: bool,
    pub absence_message: Option<String>,
}

#[derive(Serialize)]
pub struct AskerSessionsResponse {
    pub sessions: Vec<SessionItem>,
}

#[derive(Serialize)]
pub struct ConsultantSessionsResponse {
    pub offset: i64,
    pub count: i64,
    pub total: i64,
    pub sessions: Vec<SessionItem>,
}

#[derive(Debug, Deserialize)]
pub struct ConsultantSessionsQuery {
    pub status: Option<i32>,
    pub offset: Option<i64>,
    pub count: Option<i64>,
}

/// Validated paging of the consultant session list.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionPage {
    pub status: SessionStatus,
    pub offset: i64,
    pub count: i64,
}

impl ConsultantSessionsQuery {
    pub fn validate(&self) -> AppResult<SessionPage> {
        let status = match self.status {
            Some(1) => SessionStatus::New,
            Some(2) => SessionStatus::InProgress,
            _ => return Err(AppError::bad_request("status must be 1 or 2")),
        };
        let offset = self
            .offset
            .filter(|offset| *offset >= 0)
            .ok_or_else(|| AppError::bad_request("offset must be zero or positive"))?;
        let count = self
            .count
            .filter(|count| *count >= 1)
            .ok_or_else(|| AppError::bad_request("count must be positive"))?;
        Ok(SessionPage {
            status,
            offset,
            count,
        })
    }
}

fn to_items(
    conn: &mut PgConnection,
    session_list: Vec<Session>,
) -> AppResult<Vec<SessionItem>> {
    let user_ids: Vec<Uuid> = session_list.iter().map(|session| session.user_id).collect();
    let consultant_ids: Vec<Uuid> = session_list
        .iter()
        .filter_map(|session| session.consultant_id)
        .collect();

    let askers: HashMap<Uuid, User> = users::table
        .filter(users::id.eq_any(user_ids))
        .load::<User>(conn)?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();
    let assigned: HashMap<Uuid, Consultant> = consultants::table
        .filter(consultants::id.eq_any(consultant_ids))
        .load::<Consultant>(conn)?
        .into_iter()
        .map(|consultant| (consultant.id, consultant))
        .collect();

    Ok(session_list
        .into_iter()
        .map(|session| SessionItem {
            asker_username: askers.get(&session.user_id).map(|user| user.username.clone()),
            consultant: session
                .consultant_id
                .and_then(|id| assigned.get(&id))
                .map(|consultant| SessionConsultant {
                    id: consultant.id,
                    username: consultant.username.clone(),
                    first_name: consultant.first_name.clone(),
                    last_name: consultant.last_name.clone(),
                    absent: consultant.is_absent,
                    absence_message: consultant.absence_message.clone(),
                }),
            id: session.id,
            agency_id: session.agency_id,
            consulting_type: session.consulting_type_id,
            status: session.status,
            postcode: session.postcode,
            language: session.language_code,
            registration_type: session.registration_type,
            group_id: session.group_id,
            feedback_group_id: session.feedback_group_id,
            is_team_session: session.is_team_session,
            create_date: session.create_date,
            update_date: session.update_date,
        })
        .collect())
}

pub async fn list_asker_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Response> {
    authorize(&user, &[Authority::UserDefault])?;

    let mut conn = state.db()?;
    let session_list: Vec<Session> = sessions::table
        .filter(sessions::user_id.eq(user.user_id))
        .order((sessions::create_date.desc(), sessions::id.desc()))
        .load(&mut conn)?;
    if session_list.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let sessions = to_items(&mut conn, session_list)?;
    Ok(Json(AskerSessionsResponse { sessions }).into_response())
}

pub async fn list_consultant_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<ConsultantSessionsQuery>, QueryRejection>,
) -> AppResult<Response> {
    authorize(&user, &[Authority::ConsultantDefault])?;
    let Query(query) = query?;
    let page = query.validate()?;

    let mut conn = state.db()?;
    let (total, session_list): (i64, Vec<Session>) = match page.status {
        SessionStatus::New => {
            let agencies = consultant_agency_ids(&mut conn, user.user_id)?;
            let open_enquiries = || {
                sessions::table
                    .filter(sessions::status.eq(SessionStatus::New.value()))
                    .filter(sessions::consultant_id.is_null())
                    .filter(sessions::agency_id.eq_any(agencies.clone()))
            };
            let total = open_enquiries().count().get_result(&mut conn)?;
            let list = open_enquiries()
                .order((sessions::create_date.asc(), sessions::id.asc()))
                .offset(page.offset)
                .limit(page.count)
                .load(&mut conn)?;
            (total, list)
        }
        status => {
            let assigned = || {
                sessions::table
                    .filter(sessions::status.eq(status.value()))
                    .filter(sessions::consultant_id.eq(user.user_id))
            };
            let total = assigned().count().get_result(&mut conn)?;
            let list = assigned()
                .order((sessions::update_date.desc(), sessions::id.desc()))
                .offset(page.offset)
                .limit(page.count)
                .load(&mut conn)?;
            (total, list)
        }
    };

    if session_list.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let sessions = to_items(&mut conn, session_list)?;
    Ok(Json(ConsultantSessionsResponse {
        offset: page.offset,
        count: sessions.len() as i64,
        total,
        sessions,
    })
    .into_response())
}

pub async fn accept_enquiry(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<i64>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path(session_id) = path?;
    assignment::accept_enquiry(&state, &user, session_id).await?;
    Ok(StatusCode::OK)
}

pub async fn assign_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<(i64, Uuid)>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path((session_id, consultant_id)) = path?;
    assignment::assign_session(&state, &user, session_id, consultant_id).await?;
    Ok(StatusCode::OK)
}

pub async fn remove_consultant(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: Result<Path<(i64, Uuid)>, PathRejection>,
) -> AppResult<StatusCode> {
    let Path((session_id, consultant_id)) = path?;
    assignment::remove_consultant(&state, &user, session_id, consultant_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
