use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest plaintext the aes128gcm encryption in `web-push` accepts.
pub const MAX_PAYLOAD_BYTES: usize = 3052;

const DEFAULT_URL: &str = "/";

/// Body of `POST /push/notifications`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    All,
    Users(Vec<Uuid>),
}

/// A validated notification, ready to be fanned out.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipients: Recipients,
    payload: Vec<u8>,
}

/// What the service worker receives after decryption.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotificationRequestError {
    #[error("notification title must not be empty")]
    EmptyTitle,

    #[error("notification body must not be empty")]
    EmptyBody,

    #[error("notification payload is {0} bytes, the limit is 3052")]
    PayloadTooLarge(usize),
}

impl TryFrom<NotificationRequest> for NewNotification {
    type Error = NotificationRequestError;

    fn try_from(request: NotificationRequest) -> Result<Self, Self::Error> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(NotificationRequestError::EmptyTitle);
        }
        let body = request.body.trim();
        if body.is_empty() {
            return Err(NotificationRequestError::EmptyBody);
        }
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_URL);

        let payload = serde_json::to_vec(&NotificationPayload {
            title: title.to_string(),
            body: body.to_string(),
            url: url.to_string(),
        })
        .unwrap_or_default();
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(NotificationRequestError::PayloadTooLarge(payload.len()));
        }

        let recipients = match request.user_ids {
            None => Recipients::All,
            Some(user_ids) => Recipients::Users(user_ids),
        };

        Ok(Self { recipients, payload })
    }
}

impl NewNotification {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}
