use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::identity::{IdentityError, NewIdentityUser};
use crate::error::{AppError, AppResult};
use crate::models::{
    NewSession, NewUser, NewUserAgency, Session, SessionStatus, REGISTRATION_TYPE_REGISTERED,
};
use crate::schema::{sessions, user_agency, users};
use crate::state::AppState;
use crate::workflows::two_factor::is_valid_email;

const DEFAULT_LANGUAGE: &str = "de";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    pub postcode: String,
    pub agency_id: i64,
    pub consulting_type: String,
    pub terms_accepted: String,
}

/// A registration that passed syntactic validation.
#[derive(Debug, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub postcode: String,
    pub agency_id: i64,
    pub consulting_type: i32,
}

impl RegistrationRequest {
    pub fn validate(self) -> AppResult<Registration> {
        let username = self.username.trim().to_string();
        if username.is_empty() || self.password.trim().is_empty() {
            return Err(AppError::bad_request("username and password are required"));
        }
        let postcode = self.postcode.trim().to_string();
        if postcode.len() != 5 || !postcode.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(AppError::bad_request("postcode must consist of 5 digits"));
        }
        if self.agency_id <= 0 {
            return Err(AppError::bad_request("agencyId must be positive"));
        }
        let consulting_type = self
            .consulting_type
            .trim()
            .parse::<i32>()
            .ok()
            .filter(|value| *value >= 0)
            .ok_or_else(|| AppError::bad_request("consultingType must be numeric"))?;
        if self.terms_accepted.trim() != "true" {
            return Err(AppError::bad_request("terms must be accepted"));
        }
        let email = match self.email.map(|email| email.trim().to_string()) {
            Some(email) if email.is_empty() => None,
            Some(email) if !is_valid_email(&email) => {
                return Err(AppError::bad_request("invalid email address"));
            }
            other => other,
        };

        Ok(Registration {
            username,
            password: self.password,
            email,
            postcode,
            agency_id: self.agency_id,
            consulting_type,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: Uuid,
    pub session_id: i64,
}

pub async fn register_asker(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<RegistrationResponse>)> {
    let Json(payload) = payload?;
    let registration = payload.validate()?;

    {
        let mut conn = state.db()?;
        let existing = users::table
            .filter(users::username.eq(&registration.username))
            .select(users::id)
            .first::<Uuid>(&mut conn)
            .optional()?;
        if existing.is_some() {
            return Err(AppError::conflict("username is already taken"));
        }
    }

    let user_id = state
        .identity
        .create_user(&NewIdentityUser {
            username: registration.username.clone(),
            email: registration.email.clone(),
            password: registration.password.clone(),
            locale: DEFAULT_LANGUAGE.to_string(),
        })
        .await
        .map_err(|err| match err {
            IdentityError::Conflict(reason) => AppError::conflict(reason),
            other => AppError::from(other),
        })?;

    let session = match persist_registration(&state, user_id, &registration) {
        Ok(session) => session,
        Err(err) => {
            if let Err(rollback) = state.identity.delete_user(user_id).await {
                warn!(%user_id, error = %rollback, "failed to delete identity account of failed registration");
            }
            return Err(err);
        }
    };

    info!(user_id = %user_id, session_id = session.id, "registered asker");
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            id: user_id,
            session_id: session.id,
        }),
    ))
}

fn persist_registration(
    state: &AppState,
    user_id: Uuid,
    registration: &Registration,
) -> AppResult<Session> {
    let mut conn = state.db()?;
    conn.transaction::<Session, DieselError, _>(|conn| {
        diesel::insert_into(users::table)
            .values(&NewUser {
                id: user_id,
                username: registration.username.clone(),
                email: registration.email.clone(),
                rc_user_id: None,
                language_formal: false,
            })
            .execute(conn)?;
        diesel::insert_into(user_agency::table)
            .values(&NewUserAgency {
                user_id,
                agency_id: registration.agency_id,
            })
            .execute(conn)?;
        diesel::insert_into(sessions::table)
            .values(&NewSession {
                user_id,
                consultant_id: None,
                consulting_type_id: registration.consulting_type,
                registration_type: REGISTRATION_TYPE_REGISTERED.to_string(),
                postcode: registration.postcode.clone(),
                agency_id: registration.agency_id,
                language_code: DEFAULT_LANGUAGE.to_string(),
                status: SessionStatus::Initial.value(),
                group_id: None,
                feedback_group_id: None,
                is_team_session: false,
            })
            .get_result(conn)
    })
    .map_err(|err| match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            AppError::conflict("username is already taken")
        }
        other => AppError::from(other),
    })
}
