use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::KeycloakConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("request to identity provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("identity provider answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("identity account conflict: {0}")]
    Conflict(String),
    #[error("unexpected identity provider response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone)]
pub struct NewIdentityUser {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub locale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpInfo {
    #[serde(default)]
    pub otp_setup: bool,
    #[serde(default)]
    pub otp_secret: Option<String>,
    #[serde(default)]
    pub otp_secret_qr_code: Option<String>,
    #[serde(default)]
    pub otp_type: Option<String>,
}

/// Result of finishing an email based OTP setup at the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailOtpOutcome {
    Created { email: Option<String> },
    AlreadyConfigured,
    InvalidCode,
    AnotherOtpConfigActive,
    TooManyAttempts,
    Failed(String),
}

#[async_trait]
pub trait IdentityClient: Send + Sync + 'static {
    async fn create_user(&self, user: &NewIdentityUser) -> Result<Uuid, IdentityError>;

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IdentityError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<IdentityUser>, IdentityError>;

    async fn update_email(&self, user_id: Uuid, email: &str) -> Result<(), IdentityError>;

    async fn otp_info(&self, username: &str) -> Result<OtpInfo, IdentityError>;

    /// Returns `false` when the provider rejects the initial code.
    async fn setup_app_otp(
        &self,
        username: &str,
        initial_code: &str,
        secret: &str,
    ) -> Result<bool, IdentityError>;

    async fn delete_otp(&self, username: &str) -> Result<(), IdentityError>;

    async fn send_email_verification(&self, username: &str, email: &str)
        -> Result<(), IdentityError>;

    async fn finish_email_setup(
        &self,
        username: &str,
        initial_code: &str,
    ) -> Result<EmailOtpOutcome, IdentityError>;
}

pub struct KeycloakClient {
    http: Client,
    config: KeycloakConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct KeycloakErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct SuccessWithEmail {
    #[serde(default)]
    email: Option<String>,
}

impl KeycloakClient {
    pub fn new(http: Client, config: KeycloakConfig) -> Self {
        Self { http, config }
    }

    fn realm_url(&self) -> String {
        format!("{}/auth/realms/{}", self.config.base_url, self.config.realm)
    }

    fn admin_url(&self, suffix: &str) -> String {
        format!(
            "{}/auth/admin/realms/{}/{}",
            self.config.base_url, self.config.realm, suffix
        )
    }

    fn otp_url(&self, endpoint: &str, username: &str) -> String {
        format!(
            "{}/otp-config/{}/{}",
            self.realm_url(),
            endpoint,
            utf8_percent_encode(username, NON_ALPHANUMERIC)
        )
    }

    async fn bearer_token(&self) -> Result<String, IdentityError> {
        let url = format!("{}/protocol/openid-connect/token", self.realm_url());
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.admin_client_id.as_str()),
                ("client_secret", self.config.admin_client_secret.as_str()),
            ])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

async fn ensure_success(response: Response) -> Result<Response, IdentityError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(IdentityError::Status { status, body })
}

#[async_trait]
impl IdentityClient for KeycloakClient {
    async fn create_user(&self, user: &NewIdentityUser) -> Result<Uuid, IdentityError> {
        let token = self.bearer_token().await?;
        let payload = json!({
            "username": user.username,
            "email": user.email,
            "enabled": true,
            "emailVerified": user.email.is_some(),
            "credentials": [{
                "type": "password",
                "value": user.password,
                "temporary": false,
            }],
            "attributes": { "locale": [user.locale] },
        });

        let response = self
            .http
            .post(self.admin_url("users"))
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| IdentityError::Unexpected("missing location header".into()))?;
                created_user_id(location)
            }
            StatusCode::CONFLICT => {
                let body: KeycloakErrorBody = response
                    .json()
                    .await
                    .unwrap_or(KeycloakErrorBody { error_message: None });
                Err(IdentityError::Conflict(
                    body.error_message
                        .unwrap_or_else(|| "account already exists".to_string()),
                ))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(IdentityError::Status { status, body })
            }
        }
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .delete(self.admin_url(&format!("users/{user_id}")))
            .bearer_auth(&token)
            .send()
            .await?;
        ensure_success(response).await?;
        debug!(%user_id, "deleted identity account");
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<IdentityUser>, IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(self.admin_url("users"))
            .bearer_auth(&token)
            .query(&[("email", email), ("exact", "true")])
            .send()
            .await?;
        let users: Vec<IdentityUser> = ensure_success(response).await?.json().await?;
        Ok(users.into_iter().find(|user| {
            user.email
                .as_deref()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(email))
        }))
    }

    async fn update_email(&self, user_id: Uuid, email: &str) -> Result<(), IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .put(self.admin_url(&format!("users/{user_id}")))
            .bearer_auth(&token)
            .json(&json!({ "email": email.to_lowercase() }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn otp_info(&self, username: &str) -> Result<OtpInfo, IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(self.otp_url("fetch-otp-setup-info", username))
            .bearer_auth(&token)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn setup_app_otp(
        &self,
        username: &str,
        initial_code: &str,
        secret: &str,
    ) -> Result<bool, IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .put(self.otp_url("setup-otp", username))
            .bearer_auth(&token)
            .json(&json!({ "initialCode": initial_code, "secret": secret }))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(username, "identity provider rejected initial otp code");
            return Ok(false);
        }
        ensure_success(response).await?;
        Ok(true)
    }

    async fn delete_otp(&self, username: &str) -> Result<(), IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .delete(self.otp_url("delete-otp", username))
            .bearer_auth(&token)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn send_email_verification(
        &self,
        username: &str,
        email: &str,
    ) -> Result<(), IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .put(self.otp_url("send-verification-mail", username))
            .bearer_auth(&token)
            .json(&json!({ "email": email }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn finish_email_setup(
        &self,
        username: &str,
        initial_code: &str,
    ) -> Result<EmailOtpOutcome, IdentityError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(self.otp_url("setup-otp-mail", username))
            .bearer_auth(&token)
            .json(&json!({ "initialCode": initial_code }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let outcome = classify_email_setup(status, &body);
        if let EmailOtpOutcome::Failed(reason) = &outcome {
            warn!(username, %status, reason = %reason, "email otp setup failed");
        }
        Ok(outcome)
    }
}

fn created_user_id(location: &str) -> Result<Uuid, IdentityError> {
    let id = location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    Uuid::parse_str(id)
        .map_err(|_| IdentityError::Unexpected(format!("invalid user location {location}")))
}

pub fn classify_email_setup(status: StatusCode, body: &str) -> EmailOtpOutcome {
    match status {
        StatusCode::CREATED => {
            let email = serde_json::from_str::<SuccessWithEmail>(body)
                .ok()
                .and_then(|parsed| parsed.email);
            EmailOtpOutcome::Created { email }
        }
        StatusCode::OK => EmailOtpOutcome::AlreadyConfigured,
        StatusCode::UNAUTHORIZED => EmailOtpOutcome::InvalidCode,
        StatusCode::CONFLICT => EmailOtpOutcome::AnotherOtpConfigActive,
        StatusCode::TOO_MANY_REQUESTS => EmailOtpOutcome::TooManyAttempts,
        other => EmailOtpOutcome::Failed(format!("{other}: {body}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_identity_provider_answers() {
        assert_eq!(
            classify_email_setup(StatusCode::CREATED, r#"{"email":"a@b.de"}"#),
            EmailOtpOutcome::Created {
                email: Some("a@b.de".into())
            }
        );
        assert_eq!(
            classify_email_setup(StatusCode::OK, "{}"),
            EmailOtpOutcome::AlreadyConfigured
        );
        assert_eq!(
            classify_email_setup(StatusCode::UNAUTHORIZED, "the code was not valid"),
            EmailOtpOutcome::InvalidCode
        );
        assert_eq!(
            classify_email_setup(StatusCode::CONFLICT, "another otp configuration is already active"),
            EmailOtpOutcome::AnotherOtpConfigActive
        );
        assert_eq!(
            classify_email_setup(StatusCode::TOO_MANY_REQUESTS, "too many attempts"),
            EmailOtpOutcome::TooManyAttempts
        );
        assert!(matches!(
            classify_email_setup(StatusCode::BAD_GATEWAY, ""),
            EmailOtpOutcome::Failed(_)
        ));
    }

    #[test]
    fn created_body_without_email_is_still_created() {
        assert_eq!(
            classify_email_setup(StatusCode::CREATED, ""),
            EmailOtpOutcome::Created { email: None }
        );
    }

    #[test]
    fn parses_user_id_from_location_header() {
        let id = Uuid::new_v4();
        let location = format!("http://kc/auth/admin/realms/r/users/{id}");
        assert_eq!(created_user_id(&location).unwrap(), id);
        assert!(created_user_id("http://kc/users/not-a-uuid").is_err());
    }
}
