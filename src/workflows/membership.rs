use std::collections::HashSet;

use diesel::prelude::*;
use tracing::{debug, info};

use crate::{
    clients::{messaging::GroupMember, subscriptions::Subscription},
    error::AppResult,
    models::Session,
    schema::{consultant_agency, consultants},
    state::AppState,
};

/// Answers membership questions about messaging rooms and keeps session rooms
/// limited to the people allowed to read them.
pub struct ChatMembershipReconciler<'a> {
    state: &'a AppState,
}

/// The people allowed to stay in a session room besides the service accounts.
pub struct SessionParticipants<'a> {
    pub asker_rc_user_id: &'a str,
    pub consultant_rc_user_id: &'a str,
    pub keep_rc_user_id: Option<&'a str>,
}

impl<'a> ChatMembershipReconciler<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Subscriptions of the room without the system and technical users.
    pub async fn real_members(&self, room_id: &str) -> AppResult<Vec<Subscription>> {
        let subscriptions = self
            .state
            .subscriptions
            .subscriptions_of_room(room_id)
            .await?;
        Ok(without_service_accounts(
            subscriptions,
            &[self.state.system_user_id(), self.state.technical_user_id()],
        ))
    }

    pub async fn has_real_members(&self, room_id: &str) -> AppResult<bool> {
        Ok(!self.real_members(room_id).await?.is_empty())
    }

    pub async fn is_member(&self, room_id: &str, rc_user_id: &str) -> AppResult<bool> {
        let subscriptions = self
            .state
            .subscriptions
            .subscriptions_of_room(room_id)
            .await?;
        Ok(subscriptions
            .iter()
            .any(|subscription| subscription.user_id == rc_user_id))
    }

    /// Kicks a user through the technical user, which joins for the removal
    /// and leaves again afterwards.
    pub async fn remove_from_group(&self, rc_user_id: &str, group_id: &str) -> AppResult<()> {
        let messaging = &self.state.messaging;
        messaging
            .add_user_to_group(self.state.technical_user_id(), group_id)
            .await?;
        let removed = messaging.remove_user_from_group(rc_user_id, group_id).await;
        let left = messaging.leave_group_as_technical_user(group_id).await;
        removed?;
        left?;
        debug!(rc_user_id, group_id, "removed user from group");
        Ok(())
    }

    /// Removes every consultant from the session's main room that is not
    /// allowed to read it. Returns the removed messaging ids.
    pub async fn remove_unauthorized_members(
        &self,
        session: &Session,
        participants: SessionParticipants<'_>,
    ) -> AppResult<Vec<String>> {
        let Some(group_id) = session.group_id.as_deref() else {
            return Ok(Vec::new());
        };

        let members = self.state.messaging.group_members(group_id).await?;
        let member_ids: Vec<String> = members.iter().map(|member| member.id.clone()).collect();

        let (consultant_rc_ids, team_rc_ids) = {
            let mut conn = self.state.db()?;
            let consultant_rc_ids: HashSet<String> = consultants::table
                .filter(consultants::rc_user_id.eq_any(member_ids))
                .select(consultants::rc_user_id)
                .load::<Option<String>>(&mut conn)?
                .into_iter()
                .flatten()
                .collect();

            let team_rc_ids: Vec<String> = if session.opens_room_to_team() {
                consultants::table
                    .inner_join(consultant_agency::table)
                    .filter(consultant_agency::agency_id.eq(session.agency_id))
                    .filter(consultant_agency::delete_date.is_null())
                    .filter(consultants::delete_date.is_null())
                    .filter(consultants::is_team_consultant.eq(true))
                    .select(consultants::rc_user_id)
                    .load::<Option<String>>(&mut conn)?
                    .into_iter()
                    .flatten()
                    .collect()
            } else {
                Vec::new()
            };
            (consultant_rc_ids, team_rc_ids)
        };

        let mut authorized: HashSet<String> = [
            participants.asker_rc_user_id,
            participants.consultant_rc_user_id,
            self.state.technical_user_id(),
            self.state.system_user_id(),
        ]
        .into_iter()
        .chain(participants.keep_rc_user_id)
        .map(str::to_string)
        .collect();
        authorized.extend(team_rc_ids);

        let unauthorized = unauthorized_members(&members, &consultant_rc_ids, &authorized);
        for rc_user_id in &unauthorized {
            self.remove_from_group(rc_user_id, group_id).await?;
        }
        if !unauthorized.is_empty() {
            info!(
                session_id = session.id,
                group_id,
                removed = unauthorized.len(),
                "removed unauthorized consultants from session room"
            );
        }
        Ok(unauthorized)
    }
}

pub fn without_service_accounts(
    subscriptions: Vec<Subscription>,
    service_accounts: &[&str],
) -> Vec<Subscription> {
    subscriptions
        .into_iter()
        .filter(|subscription| !service_accounts.contains(&subscription.user_id.as_str()))
        .collect()
}

/// Members that are consultants but not part of the authorized set. Members
/// unknown as consultants are left alone.
pub fn unauthorized_members(
    members: &[GroupMember],
    consultant_rc_ids: &HashSet<String>,
    authorized: &HashSet<String>,
) -> Vec<String> {
    members
        .iter()
        .map(|member| &member.id)
        .filter(|id| consultant_rc_ids.contains(*id) && !authorized.contains(*id))
        .cloned()
        .collect()
}
