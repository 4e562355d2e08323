use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub rc_user_id: Option<String>,
    pub language_formal: bool,
    pub encourage_2fa: bool,
    pub delete_date: Option<NaiveDateTime>,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub rc_user_id: Option<String>,
    pub language_formal: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = consultants)]
pub struct Consultant {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub rc_user_id: Option<String>,
    pub is_absent: bool,
    pub absence_message: Option<String>,
    pub is_team_consultant: bool,
    pub language_formal: bool,
    pub encourage_2fa: bool,
    pub status: String,
    pub delete_date: Option<NaiveDateTime>,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = consultants)]
pub struct NewConsultant {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub rc_user_id: Option<String>,
    pub is_team_consultant: bool,
    pub status: String,
}

pub const CONSULTANT_STATUS_CREATED: &str = "CREATED";

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = consultant_agency)]
#[diesel(belongs_to(Consultant))]
pub struct ConsultantAgency {
    pub id: i64,
    pub consultant_id: Uuid,
    pub agency_id: i64,
    pub delete_date: Option<NaiveDateTime>,
    pub create_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = consultant_agency)]
pub struct NewConsultantAgency {
    pub consultant_id: Uuid,
    pub agency_id: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = user_agency)]
#[diesel(belongs_to(User))]
pub struct UserAgency {
    pub id: i64,
    pub user_id: Uuid,
    pub agency_id: i64,
    pub create_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_agency)]
pub struct NewUserAgency {
    pub user_id: Uuid,
    pub agency_id: i64,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = languages)]
pub struct Language {
    pub consultant_id: Uuid,
    pub language_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum SessionStatus {
    Initial,
    New,
    InProgress,
    Done,
    InArchive,
}

impl SessionStatus {
    pub fn value(self) -> i32 {
        match self {
            SessionStatus::Initial => 0,
            SessionStatus::New => 1,
            SessionStatus::InProgress => 2,
            SessionStatus::Done => 3,
            SessionStatus::InArchive => 4,
        }
    }
}

impl From<SessionStatus> for i32 {
    fn from(value: SessionStatus) -> Self {
        value.value()
    }
}

impl TryFrom<i32> for SessionStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SessionStatus::Initial),
            1 => Ok(SessionStatus::New),
            2 => Ok(SessionStatus::InProgress),
            3 => Ok(SessionStatus::Done),
            4 => Ok(SessionStatus::InArchive),
            other => Err(format!("unknown session status {other}")),
        }
    }
}

pub const REGISTRATION_TYPE_REGISTERED: &str = "REGISTERED";
pub const REGISTRATION_TYPE_ANONYMOUS: &str = "ANONYMOUS";

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = sessions)]
#[diesel(belongs_to(User))]
pub struct Session {
    pub id: i64,
    pub user_id: Uuid,
    pub consultant_id: Option<Uuid>,
    pub consulting_type_id: i32,
    pub registration_type: String,
    pub postcode: String,
    pub agency_id: i64,
    pub language_code: String,
    pub status: i32,
    pub group_id: Option<String>,
    pub feedback_group_id: Option<String>,
    pub is_team_session: bool,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

impl Session {
    pub fn status(&self) -> Option<SessionStatus> {
        SessionStatus::try_from(self.status).ok()
    }

    pub fn is_registered(&self) -> bool {
        self.registration_type == REGISTRATION_TYPE_REGISTERED
    }

    pub fn has_feedback_chat(&self) -> bool {
        self.feedback_group_id.is_some()
    }

    /// Team consultants of the agency may read a team session's room unless
    /// the session has a feedback chat, whose readers are main consultants.
    pub fn opens_room_to_team(&self) -> bool {
        self.is_team_session && !self.has_feedback_chat()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub user_id: Uuid,
    pub consultant_id: Option<Uuid>,
    pub consulting_type_id: i32,
    pub registration_type: String,
    pub postcode: String,
    pub agency_id: i64,
    pub language_code: String,
    pub status: i32,
    pub group_id: Option<String>,
    pub feedback_group_id: Option<String>,
    pub is_team_session: bool,
}

pub const CHAT_INTERVAL_WEEKLY: &str = "WEEKLY";

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = chats)]
pub struct Chat {
    pub id: i64,
    pub topic: String,
    pub consulting_type_id: i32,
    pub initial_start_date: NaiveDateTime,
    pub start_date: NaiveDateTime,
    pub duration: i32,
    pub is_repetitive: bool,
    pub chat_interval: Option<String>,
    pub is_active: bool,
    pub max_participants: Option<i32>,
    pub group_id: Option<String>,
    pub consultant_id_owner: Uuid,
    pub create_date: NaiveDateTime,
    pub update_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chats)]
pub struct NewChat {
    pub topic: String,
    pub consulting_type_id: i32,
    pub initial_start_date: NaiveDateTime,
    pub start_date: NaiveDateTime,
    pub duration: i32,
    pub is_repetitive: bool,
    pub chat_interval: Option<String>,
    pub is_active: bool,
    pub max_participants: Option<i32>,
    pub group_id: Option<String>,
    pub consultant_id_owner: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = chat_agency)]
#[diesel(belongs_to(Chat))]
pub struct ChatAgency {
    pub id: i64,
    pub chat_id: i64,
    pub agency_id: i64,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_agency)]
pub struct NewChatAgency {
    pub chat_id: i64,
    pub agency_id: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = chat_user)]
#[diesel(belongs_to(Chat))]
pub struct ChatUser {
    pub id: i64,
    pub chat_id: i64,
    pub user_id: Uuid,
    pub create_date: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = chat_user)]
pub struct NewChatUser {
    pub chat_id: i64,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(is_team_session: bool, feedback_group_id: Option<&str>) -> Session {
        let now = chrono::Utc::now().naive_utc();
        Session {
            id: 1,
            user_id: Uuid::new_v4(),
            consultant_id: None,
            consulting_type_id: 1,
            registration_type: REGISTRATION_TYPE_REGISTERED.into(),
            postcode: "79098".into(),
            agency_id: 1,
            language_code: "de".into(),
            status: SessionStatus::InProgress.value(),
            group_id: Some("room".into()),
            feedback_group_id: feedback_group_id.map(str::to_string),
            is_team_session,
            create_date: now,
            update_date: now,
        }
    }

    #[test]
    fn team_room_is_open_only_without_feedback_chat() {
        assert!(session(true, None).opens_room_to_team());
        assert!(!session(true, Some("feedback")).opens_room_to_team());
        assert!(!session(false, None).opens_room_to_team());
    }
}
