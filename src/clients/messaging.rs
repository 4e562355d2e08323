use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::RocketChatConfig;

const USER_NOT_IN_ROOM: &str = "error-user-not-in-room";

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("request to messaging backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("messaging backend answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("messaging backend rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    #[error("{0}")]
    Unexpected(String),
}

pub type MessagingResult<T> = Result<T, MessagingError>;

/// Credentials of a messaging user acting on its own behalf.
#[derive(Debug, Clone)]
pub struct RcCredentials {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupMember {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RoomInfo {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub muted: Vec<String>,
}

/// Answer of a Rocket.Chat `method.call` endpoint. The backend reports
/// `success: true` at transport level even when the method itself failed;
/// the method outcome is embedded in `message`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MethodCallResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
}

impl MethodCallResponse {
    pub fn user_not_in_room(&self) -> bool {
        self.message.contains(USER_NOT_IN_ROOM)
    }
}

#[async_trait]
pub trait MessagingClient: Send + Sync + 'static {
    /// Creates a private group owned by the system user and returns its id.
    async fn create_private_group(&self, name: &str) -> MessagingResult<String>;

    async fn delete_group(&self, group_id: &str) -> MessagingResult<()>;

    async fn add_user_to_group(&self, rc_user_id: &str, group_id: &str) -> MessagingResult<()>;

    async fn remove_user_from_group(&self, rc_user_id: &str, group_id: &str)
        -> MessagingResult<()>;

    async fn leave_group_as_technical_user(&self, group_id: &str) -> MessagingResult<()>;

    async fn group_members(&self, group_id: &str) -> MessagingResult<Vec<GroupMember>>;

    async fn room_info(&self, room_id: &str) -> MessagingResult<RoomInfo>;

    async fn username_of(&self, rc_user_id: &str) -> MessagingResult<String>;

    async fn mute_user(
        &self,
        caller: &RcCredentials,
        username: &str,
        room_id: &str,
    ) -> MessagingResult<MethodCallResponse>;

    async fn unmute_user(&self, username: &str, room_id: &str) -> MessagingResult<()>;
}

pub struct RocketChatClient {
    http: Client,
    config: RocketChatConfig,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: T,
}

#[derive(Deserialize)]
struct CreatedGroup {
    group: GroupRef,
}

#[derive(Deserialize)]
struct GroupRef {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct Members {
    #[serde(default)]
    members: Vec<GroupMember>,
}

#[derive(Deserialize)]
struct Room {
    room: RoomInfo,
}

#[derive(Deserialize)]
struct UserInfo {
    user: UserRef,
}

#[derive(Deserialize)]
struct UserRef {
    username: String,
}

impl RocketChatClient {
    pub fn new(http: Client, config: RocketChatConfig) -> Self {
        Self { http, config }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.config.base_url, endpoint)
    }

    fn system_user(&self) -> RcCredentials {
        RcCredentials {
            user_id: self.config.system_user_id.clone(),
            token: self.config.system_user_token.clone(),
        }
    }

    fn technical_user(&self) -> RcCredentials {
        RcCredentials {
            user_id: self.config.technical_user_id.clone(),
            token: self.config.technical_user_token.clone(),
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
        credentials: &RcCredentials,
    ) -> MessagingResult<T> {
        let response = request
            .header("X-User-Id", &credentials.user_id)
            .header("X-Auth-Token", &credentials.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Status { status, body });
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.success {
            return Err(MessagingError::Rejected {
                operation,
                reason: envelope.error.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        Ok(envelope.data)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        body: Value,
        credentials: &RcCredentials,
    ) -> MessagingResult<T> {
        let request = self.http.post(self.url(operation)).json(&body);
        self.send(operation, request, credentials).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &[(&str, &str)],
        credentials: &RcCredentials,
    ) -> MessagingResult<T> {
        let request = self.http.get(self.url(operation)).query(query);
        self.send(operation, request, credentials).await
    }

    async fn call_method(
        &self,
        method: &'static str,
        username: &str,
        room_id: &str,
        credentials: &RcCredentials,
    ) -> MessagingResult<MethodCallResponse> {
        let message = method_call_message(method, username, room_id);
        let request = self
            .http
            .post(self.url(&format!("method.call/{method}")))
            .json(&json!({ "message": message }));
        let response = request
            .header("X-User-Id", &credentials.user_id)
            .header("X-Auth-Token", &credentials.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

fn method_call_message(method: &str, username: &str, room_id: &str) -> String {
    json!({
        "msg": "method",
        "id": Uuid::new_v4().simple().to_string(),
        "method": method,
        "params": [{ "rid": room_id, "username": username }],
    })
    .to_string()
}

#[derive(Deserialize)]
struct Ignored {}

#[async_trait]
impl MessagingClient for RocketChatClient {
    async fn create_private_group(&self, name: &str) -> MessagingResult<String> {
        let created: CreatedGroup = self
            .post(
                "groups.create",
                json!({ "name": name, "members": [], "readOnly": false }),
                &self.system_user(),
            )
            .await?;
        Ok(created.group.id)
    }

    async fn delete_group(&self, group_id: &str) -> MessagingResult<()> {
        let _: Ignored = self
            .post(
                "groups.delete",
                json!({ "roomId": group_id }),
                &self.system_user(),
            )
            .await?;
        Ok(())
    }

    async fn add_user_to_group(&self, rc_user_id: &str, group_id: &str) -> MessagingResult<()> {
        let _: Ignored = self
            .post(
                "groups.invite",
                json!({ "roomId": group_id, "userId": rc_user_id }),
                &self.system_user(),
            )
            .await?;
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        rc_user_id: &str,
        group_id: &str,
    ) -> MessagingResult<()> {
        let _: Ignored = self
            .post(
                "groups.kick",
                json!({ "roomId": group_id, "userId": rc_user_id }),
                &self.technical_user(),
            )
            .await?;
        Ok(())
    }

    async fn leave_group_as_technical_user(&self, group_id: &str) -> MessagingResult<()> {
        let _: Ignored = self
            .post(
                "groups.leave",
                json!({ "roomId": group_id }),
                &self.technical_user(),
            )
            .await?;
        Ok(())
    }

    async fn group_members(&self, group_id: &str) -> MessagingResult<Vec<GroupMember>> {
        let members: Members = self
            .get(
                "groups.members",
                &[("roomId", group_id), ("count", "0")],
                &self.system_user(),
            )
            .await?;
        Ok(members.members)
    }

    async fn room_info(&self, room_id: &str) -> MessagingResult<RoomInfo> {
        let room: Room = self
            .get("rooms.info", &[("roomId", room_id)], &self.technical_user())
            .await?;
        Ok(room.room)
    }

    async fn username_of(&self, rc_user_id: &str) -> MessagingResult<String> {
        let info: UserInfo = self
            .get("users.info", &[("userId", rc_user_id)], &self.technical_user())
            .await?;
        Ok(info.user.username)
    }

    async fn mute_user(
        &self,
        caller: &RcCredentials,
        username: &str,
        room_id: &str,
    ) -> MessagingResult<MethodCallResponse> {
        self.call_method("muteUserInRoom", username, room_id, caller)
            .await
    }

    async fn unmute_user(&self, username: &str, room_id: &str) -> MessagingResult<()> {
        let response = self
            .call_method("unmuteUserInRoom", username, room_id, &self.technical_user())
            .await?;
        if !response.success {
            return Err(MessagingError::Rejected {
                operation: "unmuteUserInRoom",
                reason: response.message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_user_not_in_room_despite_success_flag() {
        let response: MethodCallResponse = serde_json::from_str(
            r#"{"message":"{\"msg\":\"result\",\"id\":\"1\",\"error\":{\"error\":\"error-user-not-in-room\"}}","success":true}"#,
        )
        .unwrap();
        assert!(response.success);
        assert!(response.user_not_in_room());
    }

    #[test]
    fn plain_success_is_not_user_not_in_room() {
        let response = MethodCallResponse {
            message: r#"{"msg":"result","id":"1"}"#.into(),
            success: true,
        };
        assert!(!response.user_not_in_room());
    }

    #[test]
    fn method_call_message_embeds_room_and_username() {
        let message = method_call_message("muteUserInRoom", "asker", "room-1");
        let parsed: Value = serde_json::from_str(&message).unwrap();
        assert_eq!(parsed["method"], "muteUserInRoom");
        assert_eq!(parsed["params"][0]["rid"], "room-1");
        assert_eq!(parsed["params"][0]["username"], "asker");
    }

    #[test]
    fn room_info_defaults_to_no_muted_users() {
        let room: Room = serde_json::from_str(r#"{"room":{"_id":"r1"}}"#).unwrap();
        assert_eq!(room.room.id, "r1");
        assert!(room.room.muted.is_empty());
    }
}
