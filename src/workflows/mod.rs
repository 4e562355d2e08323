//! Orchestration of sessions, chats and second factors across the database
//! and the messaging and identity collaborators.

pub mod assignment;
pub mod chat;
pub mod membership;
pub mod two_factor;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{Consultant, User};
use crate::schema::{consultant_agency, consultants, user_agency, users};

pub(crate) fn active_consultant(
    conn: &mut PgConnection,
    consultant_id: Uuid,
) -> QueryResult<Option<Consultant>> {
    consultants::table
        .find(consultant_id)
        .filter(consultants::delete_date.is_null())
        .first(conn)
        .optional()
}

pub(crate) fn active_user(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Option<User>> {
    users::table
        .find(user_id)
        .filter(users::delete_date.is_null())
        .first(conn)
        .optional()
}

pub(crate) fn consultant_agency_ids(
    conn: &mut PgConnection,
    consultant_id: Uuid,
) -> QueryResult<Vec<i64>> {
    consultant_agency::table
        .filter(consultant_agency::consultant_id.eq(consultant_id))
        .filter(consultant_agency::delete_date.is_null())
        .order(consultant_agency::id.asc())
        .select(consultant_agency::agency_id)
        .load(conn)
}

pub(crate) fn user_agency_ids(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<Vec<i64>> {
    user_agency::table
        .filter(user_agency::user_id.eq(user_id))
        .order(user_agency::id.asc())
        .select(user_agency::agency_id)
        .load(conn)
}
