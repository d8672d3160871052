//! Fan-out of one notification to every matching subscription.
//!
//! Attempts run concurrently and settle independently: a failing recipient is
//! recorded in its own [`DeliveryResult`] and never stops its siblings. A
//! `410 Gone` answer removes the subscription from the store.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::NewNotification;
use crate::push_client::{DeliveryError, PushSender};
use crate::store::{PushSubscription, StoreError, SubscriptionFilter, SubscriptionStore};

pub const SENT_MESSAGE: &str = "Push notifications sent";
pub const NO_SUBSCRIPTIONS_MESSAGE: &str = "No subscriptions found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub message: String,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<DeliveryResult>,
}

impl DispatchSummary {
    fn empty() -> Self {
        Self {
            message: NO_SUBSCRIPTIONS_MESSAGE.to_string(),
            successful: 0,
            failed: 0,
            results: Vec::new(),
        }
    }

    fn from_results(results: Vec<DeliveryResult>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            message: SENT_MESSAGE.to_string(),
            successful,
            failed: results.len() - successful,
            results,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("VAPID private key is not configured")]
    VapidKeyMissing,

    #[error("failed to load push subscriptions")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn SubscriptionStore>,
    sender: Option<Arc<dyn PushSender>>,
}

impl NotificationDispatcher {
    /// `sender` is `None` when no VAPID key is configured; every dispatch then fails.
    pub fn new(store: Arc<dyn SubscriptionStore>, sender: Option<Arc<dyn PushSender>>) -> Self {
        Self { store, sender }
    }

    #[tracing::instrument(name = "Dispatching push notification", skip_all, fields(recipients = ?notification.recipients))]
    pub async fn dispatch(&self, notification: &NewNotification) -> Result<DispatchSummary, DispatchError> {
        let sender = self.sender.as_deref().ok_or(DispatchError::VapidKeyMissing)?;

        let filter = SubscriptionFilter::from(&notification.recipients);
        let subscriptions = self.store.find_subscriptions(&filter).await?;
        if subscriptions.is_empty() {
            tracing::info!("No push subscriptions matched");
            return Ok(DispatchSummary::empty());
        }

        let attempts = subscriptions
            .iter()
            .map(|subscription| self.deliver(sender, subscription, notification.payload()));
        let summary = DispatchSummary::from_results(join_all(attempts).await);

        tracing::info!(
            successful = summary.successful,
            failed = summary.failed,
            "Push fan-out finished"
        );
        Ok(summary)
    }

    async fn deliver(&self, sender: &dyn PushSender, subscription: &PushSubscription, payload: &[u8]) -> DeliveryResult {
        let outcome = match subscription.data() {
            Ok(data) => sender.send(&data, payload).await,
            Err(e) => Err(DeliveryError::from(e)),
        };

        let mut result = DeliveryResult {
            subscription_id: subscription.id,
            user_id: subscription.user_id,
            success: outcome.is_ok(),
            error: None,
            removed: false,
        };
        let Err(error) = outcome else {
            return result;
        };

        tracing::warn!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            "Push delivery failed: {}",
            error
        );
        if matches!(error, DeliveryError::Gone) {
            result.removed = self.prune(subscription.id).await;
        }
        result.error = Some(error.to_string());
        result
    }

    async fn prune(&self, subscription_id: Uuid) -> bool {
        match self.store.delete_subscription(subscription_id).await {
            Ok(removed) => {
                tracing::info!(%subscription_id, "Removed expired push subscription");
                removed
            }
            Err(e) => {
                tracing::error!(%subscription_id, "Failed to remove expired push subscription: {:?}", e);
                false
            }
        }
    }
}
