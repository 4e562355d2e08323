pub mod identity;
pub mod mail;
pub mod messaging;
pub mod subscriptions;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::state::Clients;

pub fn build_http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_timeout(Duration::from_secs(timeout_secs.clamp(1, 5)))
        .build()
        .context("failed to build outbound http client")
}

/// Production collaborators: Keycloak, Rocket.Chat, its MongoDB and the mail service.
pub async fn build_clients(config: &AppConfig) -> Result<Clients> {
    let http = build_http_client(config.outbound_timeout_secs)?;
    let subscriptions =
        subscriptions::MongoSubscriptionStore::connect(&config.mongodb_url, &config.mongodb_database)
            .await
            .context("failed to connect to the messaging database")?;

    Ok(Clients {
        identity: Arc::new(identity::KeycloakClient::new(
            http.clone(),
            config.keycloak.clone(),
        )),
        messaging: Arc::new(messaging::RocketChatClient::new(
            http.clone(),
            config.rocket_chat.clone(),
        )),
        subscriptions: Arc::new(subscriptions),
        mail: Arc::new(mail::MailServiceClient::new(
            http,
            config.mail_service_url.clone(),
        )),
    })
}
