use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{authorize, AuthenticatedUser, Authority},
    clients::mail::{MailDto, MailsDto, TEMPLATE_ASSIGN_ENQUIRY_NOTIFICATION},
    error::{AppError, AppResult},
    jobs::{enqueue_job, JOB_SEND_EMAIL_NOTIFICATION},
    models::{Consultant, Session, SessionStatus, User},
    schema::sessions,
    state::AppState,
};

use super::membership::{ChatMembershipReconciler, SessionParticipants};
use super::{active_consultant, active_user, consultant_agency_ids};

/// Messaging ids of both sides of a session, checked before any assignment.
struct AssignmentParties {
    asker: User,
    asker_rc_user_id: String,
    consultant_rc_user_id: String,
}

fn verify_preconditions(
    conn: &mut PgConnection,
    session: &Session,
    consultant: &Consultant,
) -> AppResult<AssignmentParties> {
    let asker = active_user(conn, session.user_id)?.ok_or_else(|| {
        AppError::internal(format!("asker {} of session {} not found", session.user_id, session.id))
    })?;
    let asker_rc_user_id = asker.rc_user_id.clone().ok_or_else(|| {
        AppError::internal(format!("asker {} has no messaging id", asker.id))
    })?;
    let consultant_rc_user_id = consultant.rc_user_id.clone().ok_or_else(|| {
        AppError::internal(format!("consultant {} has no messaging id", consultant.id))
    })?;

    if session.is_registered() {
        let agencies = consultant_agency_ids(conn, consultant.id)?;
        if !agencies.contains(&session.agency_id) {
            return Err(AppError::forbidden(format!(
                "agency {} of session {} is not assigned to consultant {}",
                session.agency_id, session.id, consultant.id
            )));
        }
    }

    Ok(AssignmentParties {
        asker,
        asker_rc_user_id,
        consultant_rc_user_id,
    })
}

async fn add_consultant_to_rooms(
    state: &AppState,
    session: &Session,
    consultant_rc_user_id: &str,
) -> AppResult<()> {
    for group_id in [&session.group_id, &session.feedback_group_id]
        .into_iter()
        .flatten()
    {
        state
            .messaging
            .add_user_to_group(consultant_rc_user_id, group_id)
            .await?;
    }
    Ok(())
}

/// Explicitly (re)assigns a consultant to a session.
pub async fn assign_session(
    state: &AppState,
    caller: &AuthenticatedUser,
    session_id: i64,
    consultant_id: Uuid,
) -> AppResult<()> {
    let mut conn = state.db()?;
    let session: Session = sessions::table.find(session_id).first(&mut conn)?;
    let consultant = active_consultant(&mut conn, consultant_id)?.ok_or_else(AppError::not_found)?;

    authorize(
        caller,
        &[
            Authority::AssignConsultantToSession,
            Authority::AssignConsultantToEnquiry,
        ],
    )?;
    let initial_status = session.status();
    if initial_status == Some(SessionStatus::New) {
        authorize(caller, &[Authority::AssignConsultantToEnquiry])?;
    }
    if caller.is_advice_seeker() && session.user_id != caller.user_id {
        return Err(AppError::forbidden("session belongs to another asker"));
    }

    match session.consultant_id {
        Some(_) if initial_status == Some(SessionStatus::New) => {
            return Err(AppError::conflict(format!(
                "session {session_id} is already assigned and cannot be accepted"
            )));
        }
        Some(current) if current == consultant.id => {
            return Err(AppError::conflict(format!(
                "session {session_id} is already assigned to consultant {consultant_id}"
            )));
        }
        _ => {}
    }
    let parties = verify_preconditions(&mut conn, &session, &consultant)?;

    let new_status = match initial_status {
        Some(SessionStatus::New) => SessionStatus::InProgress.value(),
        _ => session.status,
    };
    diesel::update(sessions::table.find(session_id))
        .set((
            sessions::consultant_id.eq(Some(consultant.id)),
            sessions::status.eq(new_status),
            sessions::update_date.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;
    drop(conn);

    let caller_rc_user_id = if caller.is_consultant() {
        let mut conn = state.db()?;
        active_consultant(&mut conn, caller.user_id)?.and_then(|own| own.rc_user_id)
    } else {
        None
    };

    let reconciled = async {
        add_consultant_to_rooms(state, &session, &parties.consultant_rc_user_id).await?;
        ChatMembershipReconciler::new(state)
            .remove_unauthorized_members(
                &session,
                SessionParticipants {
                    asker_rc_user_id: &parties.asker_rc_user_id,
                    consultant_rc_user_id: &parties.consultant_rc_user_id,
                    keep_rc_user_id: caller_rc_user_id.as_deref(),
                },
            )
            .await
    }
    .await;

    if let Err(err) = reconciled {
        warn!(session_id, error = %err, "room update failed, restoring previous assignment");
        let mut conn = state.db()?;
        diesel::update(sessions::table.find(session_id))
            .set((
                sessions::consultant_id.eq(session.consultant_id),
                sessions::status.eq(session.status),
                sessions::update_date.eq(Utc::now().naive_utc()),
            ))
            .execute(&mut conn)?;
        return Err(err);
    }

    info!(session_id, consultant_id = %consultant.id, "assigned consultant to session");

    if !caller.is_advice_seeker() && caller.user_id != consultant.id {
        let mut conn = state.db()?;
        enqueue_assign_notification(&mut conn, state, &consultant, &parties.asker)?;
    }
    Ok(())
}

fn enqueue_assign_notification(
    conn: &mut PgConnection,
    state: &AppState,
    consultant: &Consultant,
    asker: &User,
) -> AppResult<()> {
    if consultant.email.trim().is_empty() {
        warn!(consultant_id = %consultant.id, "consultant has no email, skipping notification");
        return Ok(());
    }
    let mails = MailsDto {
        mails: vec![MailDto::new(TEMPLATE_ASSIGN_ENQUIRY_NOTIFICATION, &consultant.email)
            .with("name", consultant.username.as_str())
            .with("nameUser", asker.username.as_str())
            .with("url", state.config.chat_link_base_url.as_str())],
    };
    let job = enqueue_job(conn, JOB_SEND_EMAIL_NOTIFICATION, &mails, None)?;
    info!(job_id = %job.id, consultant_id = %consultant.id, "queued assign notification");
    Ok(())
}

/// The calling consultant takes an open enquiry.
pub async fn accept_enquiry(
    state: &AppState,
    caller: &AuthenticatedUser,
    session_id: i64,
) -> AppResult<()> {
    authorize(caller, &[Authority::ConsultantDefault])?;

    let mut conn = state.db()?;
    let session: Session = sessions::table
        .find(session_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::internal(format!("session {session_id} not found")))?;
    let consultant = active_consultant(&mut conn, caller.user_id)?.ok_or_else(|| {
        AppError::internal(format!("consultant {} not found", caller.user_id))
    })?;
    if session.group_id.is_none() {
        return Err(AppError::internal(format!(
            "session {session_id} has no messaging group"
        )));
    }
    if session.status() == Some(SessionStatus::InProgress) || session.consultant_id.is_some() {
        return Err(AppError::conflict(format!(
            "session {session_id} is already assigned to a consultant"
        )));
    }
    let parties = verify_preconditions(&mut conn, &session, &consultant)?;

    let updated = diesel::update(
        sessions::table
            .find(session_id)
            .filter(sessions::consultant_id.is_null()),
    )
    .set((
        sessions::consultant_id.eq(Some(consultant.id)),
        sessions::status.eq(SessionStatus::InProgress.value()),
        sessions::update_date.eq(Utc::now().naive_utc()),
    ))
    .execute(&mut conn)?;
    drop(conn);
    if updated == 0 {
        return Err(AppError::conflict(format!(
            "session {session_id} was accepted by another consultant"
        )));
    }
    info!(session_id, consultant_id = %consultant.id, "consultant accepted enquiry");

    let reconciled = async {
        add_consultant_to_rooms(state, &session, &parties.consultant_rc_user_id).await?;
        ChatMembershipReconciler::new(state)
            .remove_unauthorized_members(
                &session,
                SessionParticipants {
                    asker_rc_user_id: &parties.asker_rc_user_id,
                    consultant_rc_user_id: &parties.consultant_rc_user_id,
                    keep_rc_user_id: None,
                },
            )
            .await
    }
    .await;
    if let Err(err) = reconciled {
        warn!(session_id, error = %err, "room update after accepting enquiry failed");
    }
    Ok(())
}

/// Takes a consultant out of a session room they are not assigned to.
pub async fn remove_consultant(
    state: &AppState,
    caller: &AuthenticatedUser,
    session_id: i64,
    consultant_id: Uuid,
) -> AppResult<()> {
    authorize(
        caller,
        &[
            Authority::AssignConsultantToSession,
            Authority::AssignConsultantToEnquiry,
        ],
    )?;

    let (consultant, session) = {
        let mut conn = state.db()?;
        let consultant =
            active_consultant(&mut conn, consultant_id)?.ok_or_else(AppError::not_found)?;
        let session: Session = sessions::table.find(session_id).first(&mut conn)?;
        (consultant, session)
    };

    if session.consultant_id == Some(consultant.id) {
        return Ok(());
    }
    let (Some(group_id), Some(rc_user_id)) =
        (session.group_id.as_deref(), consultant.rc_user_id.as_deref())
    else {
        return Ok(());
    };

    let reconciler = ChatMembershipReconciler::new(state);
    if !reconciler.is_member(group_id, rc_user_id).await? {
        return Ok(());
    }
    reconciler.remove_from_group(rc_user_id, group_id).await?;
    info!(session_id, consultant_id = %consultant.id, "removed consultant from session room");
    Ok(())
}
