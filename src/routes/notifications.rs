use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use uuid::Uuid;

use super::ApiError;
use crate::auth::AuthenticatedUser;
use crate::dispatch::DispatchSummary;
use crate::domain::{NewNotification, NotificationRequest};
use crate::startup::AppState;

#[tracing::instrument(
    name = "Sending a push notification",
    skip(state, user, body),
    fields(request_id = %Uuid::new_v4(), sender_id = %user.user_id)
)]
pub async fn send_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    body: Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<Json<DispatchSummary>, ApiError> {
    let Json(request) = body?;
    let notification = NewNotification::try_from(request)?;
    let summary = state.dispatcher.dispatch(&notification).await?;
    Ok(Json(summary))
}
