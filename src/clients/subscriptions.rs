use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{bson::doc, options::ClientOptions, Client, Collection};
use serde::Deserialize;
use thiserror::Error;

const SUBSCRIPTION_COLLECTION: &str = "rocketchat_subscription";

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscription query failed: {0}")]
    Query(#[from] mongodb::error::Error),
}

/// A user's subscription to a messaging room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub room_id: String,
    pub user_id: String,
    pub username: Option<String>,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    async fn subscriptions_of_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<Subscription>, SubscriptionError>;
}

#[derive(Debug, Deserialize)]
struct SubscriptionDocument {
    rid: String,
    u: SubscribedUser,
}

#[derive(Debug, Deserialize)]
struct SubscribedUser {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    username: Option<String>,
}

pub struct MongoSubscriptionStore {
    collection: Collection<SubscriptionDocument>,
}

impl MongoSubscriptionStore {
    pub async fn connect(url: &str, database: &str) -> Result<Self, SubscriptionError> {
        let mut options = ClientOptions::parse(url).await?;
        options.app_name = Some("userservice".to_string());
        let client = Client::with_options(options)?;
        let collection = client
            .database(database)
            .collection::<SubscriptionDocument>(SUBSCRIPTION_COLLECTION);
        Ok(Self { collection })
    }
}

#[async_trait]
impl SubscriptionStore for MongoSubscriptionStore {
    async fn subscriptions_of_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let cursor = self.collection.find(doc! { "rid": room_id }, None).await?;
        let documents: Vec<SubscriptionDocument> = cursor.try_collect().await?;
        Ok(documents
            .into_iter()
            .map(|document| Subscription {
                room_id: document.rid,
                user_id: document.u.id,
                username: document.u.username,
            })
            .collect())
    }
}
