use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::ApiError;
use crate::auth::AuthenticatedUser;
use crate::domain::SubscriptionData;
use crate::startup::AppState;
use crate::store::{PushSubscription, SubscriptionFilter};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PushSubscription> for SubscriptionResponse {
    fn from(subscription: PushSubscription) -> Self {
        Self {
            id: subscription.id,
            user_id: subscription.user_id,
            created_at: subscription.created_at,
            updated_at: subscription.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidPublicKey {
    pub public_key: String,
}

#[tracing::instrument(
    name = "Registering a push subscription",
    skip(state, user, body),
    fields(request_id = %Uuid::new_v4(), user_id = %user.user_id)
)]
pub async fn register(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<SubscriptionData>, JsonRejection>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let Json(data) = body?;
    let data = data.validate()?;
    let subscription = state.store.upsert_subscription(user.user_id, &data).await?;
    Ok(Json(subscription.into()))
}

#[tracing::instrument(
    name = "Removing a push subscription",
    skip(state, user),
    fields(request_id = %Uuid::new_v4(), user_id = %user.user_id)
)]
pub async fn unsubscribe(State(state): State<AppState>, user: AuthenticatedUser) -> Result<StatusCode, ApiError> {
    let subscriptions = state
        .store
        .find_subscriptions(&SubscriptionFilter::ForUsers(vec![user.user_id]))
        .await?;
    if subscriptions.is_empty() {
        return Err(ApiError::NotFound);
    }
    for subscription in subscriptions {
        state.store.delete_subscription(subscription.id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn vapid_public_key(State(state): State<AppState>) -> Result<Json<VapidPublicKey>, ApiError> {
    let public_key = state.vapid_public_key.clone().ok_or(ApiError::PushNotConfigured)?;
    Ok(Json(VapidPublicKey { public_key }))
}
