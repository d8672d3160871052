use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::{
    Client, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use secrecy::{ExposeSecret, SecretString};
use web_push::{
    ContentEncoding, SubscriptionInfo, URL_SAFE_NO_PAD as VAPID_KEY_ENCODING, VapidSignature, VapidSignatureBuilder,
    WebPushError, WebPushMessage, WebPushMessageBuilder, request_builder::build_request,
};

use crate::configuration::{PushSettings, Urgency};
use crate::domain::{SubscriptionData, SubscriptionDataError, WebPushSubscription};

/// Why a single delivery did not go through.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("push subscription is gone")]
    Gone,

    #[error("push service answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to reach push service: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to sign or encrypt push message: {0}")]
    Message(#[from] WebPushError),

    #[error("device token subscriptions cannot be delivered over Web Push")]
    Unsupported,

    #[error(transparent)]
    InvalidSubscription(#[from] SubscriptionDataError),
}

/// Delivers one encrypted payload to one subscription.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &SubscriptionData, payload: &[u8]) -> Result<(), DeliveryError>;
}

/// The application server's VAPID identity.
#[derive(Clone)]
pub struct VapidKey {
    private_key: SecretString,
    public_key: String,
    subject: String,
}

impl VapidKey {
    /// `private_key` is the raw P-256 scalar in base64url, the format most
    /// VAPID key generators print. `subject` is a `mailto:` or `https:` contact.
    pub fn from_base64(private_key: &SecretString, subject: impl Into<String>) -> Result<Self, WebPushError> {
        let encoded = private_key.expose_secret().trim().trim_end_matches('=').to_string();
        let partial = VapidSignatureBuilder::from_base64_no_sub(&encoded, VAPID_KEY_ENCODING)?;
        let public_key = URL_SAFE_NO_PAD.encode(partial.get_public_key());
        Ok(Self {
            private_key: SecretString::from(encoded),
            public_key,
            subject: subject.into(),
        })
    }

    /// Uncompressed P-256 point, base64url; browsers pass it as `applicationServerKey`.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    fn sign(&self, subscription_info: &SubscriptionInfo) -> Result<VapidSignature, WebPushError> {
        let mut builder = VapidSignatureBuilder::from_base64(
            self.private_key.expose_secret(),
            VAPID_KEY_ENCODING,
            subscription_info,
        )?;
        builder.add_claim("sub", self.subject.as_str());
        builder.build()
    }
}

/// RFC 8030 client: VAPID-signed, aes128gcm-encrypted POSTs via reqwest.
pub struct WebPushClient {
    http_client: Client,
    vapid_key: VapidKey,
    ttl_seconds: u32,
    urgency: Urgency,
}

impl WebPushClient {
    pub fn new(vapid_key: VapidKey, settings: &PushSettings) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(settings.timeout()).build()?;
        Ok(Self {
            http_client,
            vapid_key,
            ttl_seconds: settings.ttl_seconds,
            urgency: settings.urgency,
        })
    }

    pub fn vapid_key(&self) -> &VapidKey {
        &self.vapid_key
    }

    fn build_message(&self, subscription: &WebPushSubscription, payload: &[u8]) -> Result<WebPushMessage, WebPushError> {
        let subscription_info = SubscriptionInfo::new(
            subscription.endpoint.as_str(),
            subscription.keys.p256dh.trim_end_matches('='),
            subscription.keys.auth.trim_end_matches('='),
        );
        let signature = self.vapid_key.sign(&subscription_info)?;

        let mut builder = WebPushMessageBuilder::new(&subscription_info);
        builder.set_ttl(self.ttl_seconds);
        builder.set_urgency(self.urgency.into());
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_vapid_signature(signature);
        builder.build()
    }
}

#[async_trait]
impl PushSender for WebPushClient {
    #[tracing::instrument(name = "Delivering push message", skip_all)]
    async fn send(&self, subscription: &SubscriptionData, payload: &[u8]) -> Result<(), DeliveryError> {
        let SubscriptionData::WebPush(subscription) = subscription else {
            return Err(DeliveryError::Unsupported);
        };
        let message = self.build_message(subscription, payload)?;

        // TTL, Urgency, Content-Encoding and `Authorization: vapid t=..., k=...`.
        let (parts, body) = build_request::<Vec<u8>>(message).into_parts();
        let mut request = self.http_client.post(parts.uri.to_string());
        for (name, value) in parts.headers.iter() {
            if name.as_str() == CONTENT_LENGTH.as_str() {
                continue;
            }
            request = request.header(name.as_str(), value.as_bytes());
        }
        if !parts.headers.contains_key(CONTENT_TYPE.as_str()) {
            request = request.header(CONTENT_TYPE, "application/octet-stream");
        }
        let request = request.body(body);

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::GONE {
            return Err(DeliveryError::Gone);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
