use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::dispatch::DispatchError;
use crate::domain::{NotificationRequestError, SubscriptionDataError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request body: {}", .0.body_text())]
    MalformedBody(#[from] JsonRejection),

    #[error(transparent)]
    InvalidSubscription(#[from] SubscriptionDataError),

    #[error(transparent)]
    InvalidNotification(#[from] NotificationRequestError),

    #[error("no push subscription registered for this user")]
    NotFound,

    #[error("push notifications are not configured")]
    PushNotConfigured,

    #[error("subscription storage failed")]
    Store(#[from] StoreError),
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::VapidKeyMissing => ApiError::PushNotConfigured,
            DispatchError::Store(e) => ApiError::Store(e),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedBody(_) | ApiError::InvalidSubscription(_) | ApiError::InvalidNotification(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PushNotConfigured | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
