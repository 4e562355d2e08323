use std::{env, fs};

use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_algorithm: Algorithm,
    pub jwt_secret: Option<String>,
    pub jwt_public_key_pem: Option<String>,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub cors_allowed_origin: Option<String>,
    pub csrf: CsrfConfig,
    pub keycloak: KeycloakConfig,
    pub rocket_chat: RocketChatConfig,
    pub mongodb_url: String,
    pub mongodb_database: String,
    pub mail_service_url: String,
    pub two_factor_auth_user_enabled: bool,
    pub two_factor_auth_consultant_enabled: bool,
    pub outbound_timeout_secs: u64,
    pub chat_link_base_url: String,
    pub embedded_worker: bool,
    pub worker_poll_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CsrfConfig {
    pub cookie_name: String,
    pub header_name: String,
    pub whitelist_header: Option<String>,
    pub whitelist_paths: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct KeycloakConfig {
    pub base_url: String,
    pub realm: String,
    pub admin_client_id: String,
    pub admin_client_secret: String,
}

#[derive(Clone, Debug)]
pub struct RocketChatConfig {
    pub base_url: String,
    pub system_user_id: String,
    pub system_user_token: String,
    pub technical_user_id: String,
    pub technical_user_token: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_algorithm =
            parse_algorithm(&env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()))?;
        let jwt_secret = env::var("JWT_SECRET").ok().filter(|value| !value.is_empty());
        let jwt_public_key_pem = match env::var("JWT_PUBLIC_KEY_PATH") {
            Ok(path) => Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("failed to read JWT_PUBLIC_KEY_PATH {path}"))?,
            ),
            Err(_) => None,
        };
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "userservice".to_string());
        let jwt_audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "account".to_string());
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();

        let csrf = CsrfConfig {
            cookie_name: env::var("CSRF_COOKIE_NAME").unwrap_or_else(|_| "CSRF-TOKEN".to_string()),
            header_name: env::var("CSRF_HEADER_NAME")
                .unwrap_or_else(|_| "X-CSRF-TOKEN".to_string()),
            whitelist_header: Some(
                env::var("CSRF_WHITELIST_HEADER")
                    .unwrap_or_else(|_| "X-WHITELIST-HEADER".to_string()),
            )
            .filter(|value| !value.trim().is_empty()),
            whitelist_paths: split_list(
                &env::var("CSRF_WHITELIST_PATHS").unwrap_or_else(|_| "/health".to_string()),
            ),
        };

        let keycloak = KeycloakConfig {
            base_url: trim_base_url(
                &env::var("KEYCLOAK_BASE_URL").context("KEYCLOAK_BASE_URL must be set")?,
            ),
            realm: env::var("KEYCLOAK_REALM").unwrap_or_else(|_| "online-beratung".to_string()),
            admin_client_id: env::var("KEYCLOAK_ADMIN_CLIENT_ID")
                .unwrap_or_else(|_| "admin-cli".to_string()),
            admin_client_secret: env::var("KEYCLOAK_ADMIN_CLIENT_SECRET")
                .context("KEYCLOAK_ADMIN_CLIENT_SECRET must be set")?,
        };

        let rocket_chat = RocketChatConfig {
            base_url: trim_base_url(
                &env::var("ROCKET_CHAT_BASE_URL").context("ROCKET_CHAT_BASE_URL must be set")?,
            ),
            system_user_id: env::var("ROCKET_CHAT_SYSTEM_USER_ID")
                .context("ROCKET_CHAT_SYSTEM_USER_ID must be set")?,
            system_user_token: env::var("ROCKET_CHAT_SYSTEM_USER_TOKEN")
                .context("ROCKET_CHAT_SYSTEM_USER_TOKEN must be set")?,
            technical_user_id: env::var("ROCKET_CHAT_TECHNICAL_USER_ID")
                .context("ROCKET_CHAT_TECHNICAL_USER_ID must be set")?,
            technical_user_token: env::var("ROCKET_CHAT_TECHNICAL_USER_TOKEN")
                .context("ROCKET_CHAT_TECHNICAL_USER_TOKEN must be set")?,
        };

        let mongodb_url =
            env::var("MONGODB_URL").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let mongodb_database =
            env::var("MONGODB_DATABASE").unwrap_or_else(|_| "rocketchat".to_string());
        let mail_service_url = trim_base_url(
            &env::var("MAIL_SERVICE_URL").context("MAIL_SERVICE_URL must be set")?,
        );
        let two_factor_auth_user_enabled = parse_flag("TWO_FACTOR_AUTH_USER_ENABLED", true);
        let two_factor_auth_consultant_enabled =
            parse_flag("TWO_FACTOR_AUTH_CONSULTANT_ENABLED", true);
        let outbound_timeout_secs = env::var("OUTBOUND_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("OUTBOUND_TIMEOUT_SECS must be an integer")?;
        let chat_link_base_url = env::var("CHAT_LINK_BASE_URL").unwrap_or_default();
        let embedded_worker = parse_flag("EMBEDDED_WORKER", true);
        let worker_poll_interval_secs = env::var("WORKER_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .context("WORKER_POLL_INTERVAL_SECS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_algorithm,
            jwt_secret,
            jwt_public_key_pem,
            jwt_issuer,
            jwt_audience,
            cors_allowed_origin,
            csrf,
            keycloak,
            rocket_chat,
            mongodb_url,
            mongodb_database,
            mail_service_url,
            two_factor_auth_user_enabled,
            two_factor_auth_consultant_enabled,
            outbound_timeout_secs,
            chat_link_base_url,
            embedded_worker,
            worker_poll_interval_secs,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_url(&self.database_url)
    }

    pub fn redacted_mongodb_url(&self) -> String {
        redact_url(&self.mongodb_url)
    }
}

fn parse_algorithm(raw: &str) -> Result<Algorithm> {
    raw.trim()
        .to_ascii_uppercase()
        .parse()
        .with_context(|| format!("JWT_ALGORITHM {raw:?} is not a supported algorithm"))
}

fn parse_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn trim_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
