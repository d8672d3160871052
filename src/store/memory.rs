use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PushSubscription, StoreError, SubscriptionFilter, SubscriptionStore};
use crate::domain::SubscriptionData;

/// Process-local store for unit tests, with switchable failures.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<Vec<PushSubscription>>,
    unavailable: AtomicBool,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row as-is, bypassing validation, e.g. legacy or corrupt data.
    pub async fn insert_raw(&self, user_id: Uuid, subscription_data: impl Into<String>) -> PushSubscription {
        let now = chrono::Utc::now();
        let subscription = PushSubscription {
            id: Uuid::new_v4(),
            user_id,
            subscription_data: subscription_data.into(),
            created_at: now,
            updated_at: now,
        };
        self.subscriptions.lock().await.push(subscription.clone());
        subscription
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn find_subscriptions(&self, filter: &SubscriptionFilter) -> Result<Vec<PushSubscription>, StoreError> {
        self.check_available()?;
        let subscriptions = self.subscriptions.lock().await;
        Ok(subscriptions
            .iter()
            .filter(|s| match filter {
                SubscriptionFilter::All => true,
                SubscriptionFilter::ForUsers(user_ids) => user_ids.contains(&s.user_id),
            })
            .cloned()
            .collect())
    }

    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        data: &SubscriptionData,
    ) -> Result<PushSubscription, StoreError> {
        self.check_available()?;
        let now = chrono::Utc::now();
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(existing) = subscriptions.iter_mut().find(|s| s.user_id == user_id) {
            existing.subscription_data = data.encode();
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let subscription = PushSubscription {
            id: Uuid::new_v4(),
            user_id,
            subscription_data: data.encode(),
            created_at: now,
            updated_at: now,
        };
        subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn delete_subscription(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut subscriptions = self.subscriptions.lock().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        Ok(subscriptions.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use claim::assert_err;

    use super::*;

    #[tokio::test]
    async fn upsert_replaces_the_existing_row() {
        let store = InMemorySubscriptionStore::new();
        let user_id = Uuid::new_v4();

        let first = store
            .upsert_subscription(user_id, &SubscriptionData::Token { token: "a".into() })
            .await
            .unwrap();
        let second = store
            .upsert_subscription(user_id, &SubscriptionData::Token { token: "b".into() })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.len().await, 1);
        assert_eq!(
            second.data().unwrap(),
            SubscriptionData::Token { token: "b".into() }
        );
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemorySubscriptionStore::new();
        store.set_unavailable(true);
        assert_err!(store.find_subscriptions(&SubscriptionFilter::All).await);
        assert_err!(store.delete_subscription(Uuid::new_v4()).await);
    }
}
