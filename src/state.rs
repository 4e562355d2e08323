use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    clients::{
        identity::IdentityClient, mail::MailClient, messaging::MessagingClient,
        subscriptions::SubscriptionStore,
    },
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Outbound collaborators, grouped so tests can swap them for fakes.
#[derive(Clone)]
pub struct Clients {
    pub identity: Arc<dyn IdentityClient>,
    pub messaging: Arc<dyn MessagingClient>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub mail: Arc<dyn MailClient>,
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub identity: Arc<dyn IdentityClient>,
    pub messaging: Arc<dyn MessagingClient>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub mail: Arc<dyn MailClient>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, jwt: JwtService, clients: Clients) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            identity: clients.identity,
            messaging: clients.messaging,
            subscriptions: clients.subscriptions,
            mail: clients.mail,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn technical_user_id(&self) -> &str {
        &self.config.rocket_chat.technical_user_id
    }

    pub fn system_user_id(&self) -> &str {
        &self.config.rocket_chat.system_user_id
    }
}
