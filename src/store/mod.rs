//! Persistence of push subscriptions.

mod database;
#[cfg(test)]
mod memory;

pub use database::DatabaseSubscriptionStore;
#[cfg(test)]
pub use memory::InMemorySubscriptionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use uuid::Uuid;

use crate::domain::{Recipients, SubscriptionData, SubscriptionDataError};
use crate::entities::push_subscriptions;

/// A stored subscription. `subscription_data` is kept raw and decoded per
/// delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PushSubscription {
    pub fn data(&self) -> Result<SubscriptionData, SubscriptionDataError> {
        SubscriptionData::decode(&self.subscription_data)
    }
}

impl From<push_subscriptions::Model> for PushSubscription {
    fn from(model: push_subscriptions::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            subscription_data: model.subscription_data,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionFilter {
    All,
    ForUsers(Vec<Uuid>),
}

impl From<&Recipients> for SubscriptionFilter {
    fn from(recipients: &Recipients) -> Self {
        match recipients {
            Recipients::All => SubscriptionFilter::All,
            Recipients::Users(user_ids) => SubscriptionFilter::ForUsers(user_ids.clone()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("subscription for user {0} vanished after upsert")]
    Missing(Uuid),

    #[error("subscription store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_subscriptions(&self, filter: &SubscriptionFilter) -> Result<Vec<PushSubscription>, StoreError>;

    /// Store `data` as the user's only subscription, replacing any previous one.
    /// The row id and `created_at` survive a replacement.
    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        data: &SubscriptionData,
    ) -> Result<PushSubscription, StoreError>;

    /// Returns whether a row was removed.
    async fn delete_subscription(&self, id: Uuid) -> Result<bool, StoreError>;
}
