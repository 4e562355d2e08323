#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use jsonwebtoken::Algorithm;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use userservice::auth::jwt::JwtService;
use userservice::clients::identity::{
    EmailOtpOutcome, IdentityClient, IdentityError, IdentityUser, NewIdentityUser, OtpInfo,
};
use userservice::clients::mail::{MailClient, MailError, MailsDto};
use userservice::clients::messaging::{
    GroupMember, MessagingClient, MessagingError, MessagingResult, MethodCallResponse,
    RcCredentials, RoomInfo,
};
use userservice::clients::subscriptions::{Subscription, SubscriptionError, SubscriptionStore};
use userservice::config::{AppConfig, CsrfConfig, KeycloakConfig, RocketChatConfig};
use userservice::db::{self, PgPool};
use userservice::models::{
    Job, NewConsultant, NewConsultantAgency, NewSession, NewUser, NewUserAgency, Session,
    SessionStatus, CONSULTANT_STATUS_CREATED, REGISTRATION_TYPE_REGISTERED,
};
use userservice::routes;
use userservice::schema;
use userservice::state::{AppState, Clients};
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const CSRF_TOKEN: &str = "test-csrf-token";
pub const SYSTEM_USER_ID: &str = "rc-system";
pub const TECHNICAL_USER_ID: &str = "rc-technical";
pub const CHAT_LINK_BASE: &str = "https://beratung.example.org";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

type CreateHook = Arc<dyn Fn(&NewIdentityUser) + Send + Sync>;

#[derive(Default)]
struct IdentityState {
    usernames: HashSet<String>,
    accounts: HashMap<Uuid, String>,
    deleted_users: Vec<Uuid>,
    before_create: Option<CreateHook>,
    owners_by_email: HashMap<String, String>,
    pending_email: HashMap<String, String>,
    email_outcome: Option<EmailOtpOutcome>,
    updated_emails: Vec<(Uuid, String)>,
    deleted_otp: Vec<String>,
}

/// In-memory identity provider.
#[derive(Default)]
pub struct FakeIdentity {
    state: Mutex<IdentityState>,
}

impl FakeIdentity {
    pub async fn register_email_owner(&self, email: &str, username: &str) {
        let mut guard = self.state.lock().await;
        guard
            .owners_by_email
            .insert(email.to_lowercase(), username.to_string());
    }

    pub async fn set_email_outcome(&self, outcome: EmailOtpOutcome) {
        self.state.lock().await.email_outcome = Some(outcome);
    }

    pub async fn pending_email(&self, username: &str) -> Option<String> {
        self.state.lock().await.pending_email.get(username).cloned()
    }

    pub async fn updated_emails(&self) -> Vec<(Uuid, String)> {
        self.state.lock().await.updated_emails.clone()
    }

    pub async fn deleted_otp(&self) -> Vec<String> {
        self.state.lock().await.deleted_otp.clone()
    }

    pub async fn deleted_users(&self) -> Vec<Uuid> {
        self.state.lock().await.deleted_users.clone()
    }

    pub async fn has_account(&self, username: &str) -> bool {
        self.state.lock().await.usernames.contains(username)
    }

    /// Runs `hook` inside every account creation, before the id is returned.
    pub async fn before_create(&self, hook: impl Fn(&NewIdentityUser) + Send + Sync + 'static) {
        self.state.lock().await.before_create = Some(Arc::new(hook));
    }
}

#[async_trait]
impl IdentityClient for FakeIdentity {
    async fn create_user(&self, user: &NewIdentityUser) -> Result<Uuid, IdentityError> {
        let mut guard = self.state.lock().await;
        if !guard.usernames.insert(user.username.clone()) {
            return Err(IdentityError::Conflict(format!(
                "username {} exists",
                user.username
            )));
        }
        if let Some(email) = user.email.as_ref() {
            if guard.owners_by_email.contains_key(&email.to_lowercase()) {
                return Err(IdentityError::Conflict(format!("email {email} exists")));
            }
            guard
                .owners_by_email
                .insert(email.to_lowercase(), user.username.clone());
        }
        if let Some(hook) = guard.before_create.clone() {
            hook(user);
        }
        let id = Uuid::new_v4();
        guard.accounts.insert(id, user.username.clone());
        Ok(id)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IdentityError> {
        let mut guard = self.state.lock().await;
        let username = guard
            .accounts
            .remove(&user_id)
            .ok_or_else(|| IdentityError::Unexpected(format!("unknown user {user_id}")))?;
        guard.usernames.remove(&username);
        guard.owners_by_email.retain(|_, owner| owner != &username);
        guard.deleted_users.push(user_id);
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<IdentityUser>, IdentityError> {
        let guard = self.state.lock().await;
        Ok(guard
            .owners_by_email
            .get(&email.to_lowercase())
            .map(|username| IdentityUser {
                id: format!("kc-{username}"),
                username: username.clone(),
                email: Some(email.to_string()),
            }))
    }

    async fn update_email(&self, user_id: Uuid, email: &str) -> Result<(), IdentityError> {
        let mut guard = self.state.lock().await;
        guard.updated_emails.push((user_id, email.to_string()));
        Ok(())
    }

    async fn otp_info(&self, _username: &str) -> Result<OtpInfo, IdentityError> {
        Ok(OtpInfo {
            otp_setup: false,
            otp_secret: Some("A".repeat(32)),
            otp_secret_qr_code: None,
            otp_type: None,
        })
    }

    async fn setup_app_otp(
        &self,
        _username: &str,
        initial_code: &str,
        _secret: &str,
    ) -> Result<bool, IdentityError> {
        Ok(initial_code == "123456")
    }

    async fn delete_otp(&self, username: &str) -> Result<(), IdentityError> {
        self.state.lock().await.deleted_otp.push(username.to_string());
        Ok(())
    }

    async fn send_email_verification(
        &self,
        username: &str,
        email: &str,
    ) -> Result<(), IdentityError> {
        let mut guard = self.state.lock().await;
        guard
            .pending_email
            .insert(username.to_string(), email.to_string());
        Ok(())
    }

    async fn finish_email_setup(
        &self,
        username: &str,
        _initial_code: &str,
    ) -> Result<EmailOtpOutcome, IdentityError> {
        let guard = self.state.lock().await;
        if let Some(outcome) = guard.email_outcome.clone() {
            return Ok(outcome);
        }
        Ok(EmailOtpOutcome::Created {
            email: guard.pending_email.get(username).cloned(),
        })
    }
}

#[derive(Default)]
struct ChatState {
    next_group: u32,
    groups: HashMap<String, Vec<String>>,
    muted: HashMap<String, Vec<String>>,
    usernames: HashMap<String, String>,
    deleted_groups: Vec<String>,
    removed: Vec<(String, String)>,
    failing: HashSet<&'static str>,
}

/// Rocket.Chat stand-in serving both the REST client and the subscription store,
/// so room membership stays consistent between the two.
#[derive(Default)]
pub struct FakeRocketChat {
    state: Mutex<ChatState>,
}

impl FakeRocketChat {
    pub async fn register_user(&self, rc_user_id: &str, username: &str) {
        let mut guard = self.state.lock().await;
        guard
            .usernames
            .insert(rc_user_id.to_string(), username.to_string());
    }

    /// Creates a room with the given members, bypassing the service.
    pub async fn seed_group(&self, group_id: &str, members: &[&str]) {
        let mut guard = self.state.lock().await;
        guard.groups.insert(
            group_id.to_string(),
            members.iter().map(|member| member.to_string()).collect(),
        );
    }

    pub async fn members(&self, group_id: &str) -> Vec<String> {
        let guard = self.state.lock().await;
        guard.groups.get(group_id).cloned().unwrap_or_default()
    }

    pub async fn group_exists(&self, group_id: &str) -> bool {
        self.state.lock().await.groups.contains_key(group_id)
    }

    pub async fn deleted_groups(&self) -> Vec<String> {
        self.state.lock().await.deleted_groups.clone()
    }

    pub async fn muted(&self, group_id: &str) -> Vec<String> {
        let guard = self.state.lock().await;
        guard.muted.get(group_id).cloned().unwrap_or_default()
    }

    pub async fn removed(&self) -> Vec<(String, String)> {
        self.state.lock().await.removed.clone()
    }

    pub async fn group_ids(&self) -> Vec<String> {
        let guard = self.state.lock().await;
        let mut ids: Vec<String> = guard.groups.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Makes every later call of `operation` fail until [`Self::recover`].
    pub async fn fail(&self, operation: &'static str) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn recover(&self, operation: &'static str) {
        self.state.lock().await.failing.remove(operation);
    }
}

fn unknown_group(group_id: &str) -> MessagingError {
    MessagingError::Rejected {
        operation: "groups",
        reason: format!("group {group_id} not found"),
    }
}

impl ChatState {
    fn check(&self, operation: &'static str) -> MessagingResult<()> {
        if self.failing.contains(operation) {
            return Err(MessagingError::Unexpected(format!("{operation} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for FakeRocketChat {
    async fn create_private_group(&self, name: &str) -> MessagingResult<String> {
        let mut guard = self.state.lock().await;
        guard.check("create_private_group")?;
        guard.next_group += 1;
        let group_id = format!("group-{}-{name}", guard.next_group);
        guard
            .groups
            .insert(group_id.clone(), vec![SYSTEM_USER_ID.to_string()]);
        Ok(group_id)
    }

    async fn delete_group(&self, group_id: &str) -> MessagingResult<()> {
        let mut guard = self.state.lock().await;
        guard.check("delete_group")?;
        guard
            .groups
            .remove(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        guard.muted.remove(group_id);
        guard.deleted_groups.push(group_id.to_string());
        Ok(())
    }

    async fn add_user_to_group(&self, rc_user_id: &str, group_id: &str) -> MessagingResult<()> {
        let mut guard = self.state.lock().await;
        guard.check("add_user_to_group")?;
        let members = guard
            .groups
            .get_mut(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        if !members.iter().any(|member| member == rc_user_id) {
            members.push(rc_user_id.to_string());
        }
        Ok(())
    }

    async fn remove_user_from_group(
        &self,
        rc_user_id: &str,
        group_id: &str,
    ) -> MessagingResult<()> {
        let mut guard = self.state.lock().await;
        let members = guard
            .groups
            .get_mut(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        members.retain(|member| member != rc_user_id);
        guard
            .removed
            .push((rc_user_id.to_string(), group_id.to_string()));
        Ok(())
    }

    async fn leave_group_as_technical_user(&self, group_id: &str) -> MessagingResult<()> {
        let mut guard = self.state.lock().await;
        let members = guard
            .groups
            .get_mut(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        members.retain(|member| member != TECHNICAL_USER_ID);
        Ok(())
    }

    async fn group_members(&self, group_id: &str) -> MessagingResult<Vec<GroupMember>> {
        let guard = self.state.lock().await;
        let members = guard
            .groups
            .get(group_id)
            .ok_or_else(|| unknown_group(group_id))?;
        Ok(members
            .iter()
            .map(|id| GroupMember {
                id: id.clone(),
                username: guard.usernames.get(id).cloned().unwrap_or_else(|| id.clone()),
                name: None,
            })
            .collect())
    }

    async fn room_info(&self, room_id: &str) -> MessagingResult<RoomInfo> {
        let guard = self.state.lock().await;
        guard.check("room_info")?;
        if !guard.groups.contains_key(room_id) {
            return Err(unknown_group(room_id));
        }
        Ok(RoomInfo {
            id: room_id.to_string(),
            muted: guard.muted.get(room_id).cloned().unwrap_or_default(),
        })
    }

    async fn username_of(&self, rc_user_id: &str) -> MessagingResult<String> {
        let guard = self.state.lock().await;
        guard
            .usernames
            .get(rc_user_id)
            .cloned()
            .ok_or_else(|| MessagingError::Unexpected(format!("unknown user {rc_user_id}")))
    }

    async fn mute_user(
        &self,
        _caller: &RcCredentials,
        username: &str,
        room_id: &str,
    ) -> MessagingResult<MethodCallResponse> {
        let mut guard = self.state.lock().await;
        let in_room = guard.groups.get(room_id).is_some_and(|members| {
            members
                .iter()
                .any(|member| guard.usernames.get(member).map(String::as_str) == Some(username))
        });
        if !in_room {
            return Ok(MethodCallResponse {
                message: r#"{"msg":"result","error":{"error":"error-user-not-in-room"}}"#
                    .to_string(),
                success: true,
            });
        }
        guard
            .muted
            .entry(room_id.to_string())
            .or_default()
            .push(username.to_string());
        Ok(MethodCallResponse {
            message: r#"{"msg":"result","result":true}"#.to_string(),
            success: true,
        })
    }

    async fn unmute_user(&self, username: &str, room_id: &str) -> MessagingResult<()> {
        let mut guard = self.state.lock().await;
        if let Some(muted) = guard.muted.get_mut(room_id) {
            muted.retain(|entry| entry != username);
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for FakeRocketChat {
    async fn subscriptions_of_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let guard = self.state.lock().await;
        if guard.failing.contains("subscriptions") {
            return Err(SubscriptionError::Query(mongodb::error::Error::custom(
                "subscription store unavailable",
            )));
        }
        Ok(guard
            .groups
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|member| Subscription {
                        room_id: room_id.to_string(),
                        user_id: member.clone(),
                        username: guard.usernames.get(member).cloned(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeMail {
    sent: Mutex<Vec<MailsDto>>,
}

impl FakeMail {
    pub async fn sent(&self) -> Vec<MailsDto> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailClient for FakeMail {
    async fn send_mails(&self, mails: &MailsDto) -> Result<(), MailError> {
        self.sent.lock().await.push(mails.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    pub identity: Arc<FakeIdentity>,
    pub rocket_chat: Arc<FakeRocketChat>,
    pub mail: Arc<FakeMail>,
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        database_url,
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_algorithm: Algorithm::HS256,
        jwt_secret: Some("test-secret".to_string()),
        jwt_public_key_pem: None,
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "account".to_string(),
        cors_allowed_origin: None,
        csrf: CsrfConfig {
            cookie_name: "CSRF-TOKEN".to_string(),
            header_name: "X-CSRF-TOKEN".to_string(),
            whitelist_header: Some("X-WHITELIST-HEADER".to_string()),
            whitelist_paths: vec!["/health".to_string()],
        },
        keycloak: KeycloakConfig {
            base_url: "http://keycloak.invalid".to_string(),
            realm: "online-beratung".to_string(),
            admin_client_id: "admin-cli".to_string(),
            admin_client_secret: "secret".to_string(),
        },
        rocket_chat: RocketChatConfig {
            base_url: "http://rocketchat.invalid".to_string(),
            system_user_id: SYSTEM_USER_ID.to_string(),
            system_user_token: "system-token".to_string(),
            technical_user_id: TECHNICAL_USER_ID.to_string(),
            technical_user_token: "technical-token".to_string(),
        },
        mongodb_url: "mongodb://localhost:27017".to_string(),
        mongodb_database: "rocketchat".to_string(),
        mail_service_url: "http://mail.invalid".to_string(),
        two_factor_auth_user_enabled: true,
        two_factor_auth_consultant_enabled: true,
        outbound_timeout_secs: 1,
        chat_link_base_url: CHAT_LINK_BASE.to_string(),
        embedded_worker: false,
        worker_poll_interval_secs: 1,
    }
}

impl TestApp {
    /// Returns `None` when no test database is configured.
    pub async fn new() -> Result<Option<Self>> {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping database test");
            return Ok(None);
        };

        let mut config = test_config(database_url);
        adjust(&mut config);

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let identity = Arc::new(FakeIdentity::default());
        let rocket_chat = Arc::new(FakeRocketChat::default());
        let mail = Arc::new(FakeMail::default());
        let clients = Clients {
            identity: identity.clone(),
            messaging: rocket_chat.clone(),
            subscriptions: rocket_chat.clone(),
            mail: mail.clone(),
        };
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, jwt, clients);
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            identity,
            rocket_chat,
            mail,
        }))
    }

    pub fn token(&self, user_id: Uuid, username: &str, roles: &[&str]) -> String {
        self.state
            .jwt
            .generate_token(user_id, username, roles)
            .expect("token generation")
    }

    pub async fn insert_consultant(
        &self,
        username: &str,
        rc_user_id: Option<&str>,
        agency_ids: &[i64],
    ) -> Result<Uuid> {
        let consultant = NewConsultant {
            id: Uuid::new_v4(),
            username: username.to_string(),
            first_name: format!("{username}-first"),
            last_name: format!("{username}-last"),
            email: format!("{username}@example.org"),
            rc_user_id: rc_user_id.map(str::to_string),
            is_team_consultant: false,
            status: CONSULTANT_STATUS_CREATED.to_string(),
        };
        let agency_ids = agency_ids.to_vec();
        let id = consultant.id;
        self.with_conn(move |conn| {
            diesel::insert_into(schema::consultants::table)
                .values(&consultant)
                .execute(conn)
                .context("failed to insert consultant")?;
            for agency_id in agency_ids {
                diesel::insert_into(schema::consultant_agency::table)
                    .values(&NewConsultantAgency {
                        consultant_id: consultant.id,
                        agency_id,
                    })
                    .execute(conn)
                    .context("failed to insert consultant agency")?;
            }
            Ok(())
        })
        .await?;
        if let Some(rc_user_id) = rc_user_id {
            self.rocket_chat.register_user(rc_user_id, username).await;
        }
        Ok(id)
    }

    pub async fn insert_asker(
        &self,
        username: &str,
        rc_user_id: Option<&str>,
        agency_id: i64,
    ) -> Result<Uuid> {
        let user = NewUser {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: Some(format!("{username}@example.org")),
            rc_user_id: rc_user_id.map(str::to_string),
            language_formal: false,
        };
        let id = user.id;
        self.with_conn(move |conn| {
            diesel::insert_into(schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            diesel::insert_into(schema::user_agency::table)
                .values(&NewUserAgency {
                    user_id: user.id,
                    agency_id,
                })
                .execute(conn)
                .context("failed to insert user agency")?;
            Ok(())
        })
        .await?;
        if let Some(rc_user_id) = rc_user_id {
            self.rocket_chat.register_user(rc_user_id, username).await;
        }
        Ok(id)
    }

    pub async fn insert_session(
        &self,
        user_id: Uuid,
        agency_id: i64,
        status: SessionStatus,
        consultant_id: Option<Uuid>,
        group_id: Option<&str>,
    ) -> Result<i64> {
        let session = NewSession {
            user_id,
            consultant_id,
            consulting_type_id: 1,
            registration_type: REGISTRATION_TYPE_REGISTERED.to_string(),
            postcode: "79098".to_string(),
            agency_id,
            language_code: "de".to_string(),
            status: status.value(),
            group_id: group_id.map(str::to_string),
            feedback_group_id: None,
            is_team_session: false,
        };
        self.with_conn(move |conn| {
            let id = diesel::insert_into(schema::sessions::table)
                .values(&session)
                .returning(schema::sessions::id)
                .get_result::<i64>(conn)
                .context("failed to insert session")?;
            Ok(id)
        })
        .await
    }

    pub async fn load_session(&self, session_id: i64) -> Result<Session> {
        self.with_conn(move |conn| {
            schema::sessions::table
                .find(session_id)
                .first::<Session>(conn)
                .context("failed to load session")
        })
        .await
    }

    pub async fn jobs_by_type(&self, job_type: &str) -> Result<Vec<Job>> {
        let job_type = job_type.to_string();
        self.with_conn(move |conn| {
            schema::jobs::table
                .filter(schema::jobs::job_type.eq(&job_type))
                .load::<Job>(conn)
                .context("failed to load jobs")
        })
        .await
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_with_headers(method, path, body, token, &[]).await
    }

    /// Sends a request carrying the CSRF cookie and header plus `headers`.
    pub async fn send_with_headers(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Result<hyper::Response<Body>> {
        let mut all = vec![
            ("cookie", format!("CSRF-TOKEN={CSRF_TOKEN}")),
            ("X-CSRF-TOKEN", CSRF_TOKEN.to_string()),
        ];
        all.extend(headers.iter().map(|(name, value)| (*name, value.to_string())));
        self.send_raw(method, path, body, token, &all).await
    }

    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        token: Option<&str>,
        headers: &[(&str, String)],
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, None, token).await
    }

    pub async fn put_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send(Method::PUT, path, Some(serde_json::to_value(payload)?), token)
            .await
    }

    pub async fn post_json<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Some(serde_json::to_value(payload)?), token)
            .await
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn body_json(response: hyper::Response<Body>) -> Result<serde_json::Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&bytes).context("response body is not json")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE chat_user, chat_agency, chats, languages, consultant_agency, user_agency, sessions, consultants, users, jobs RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
