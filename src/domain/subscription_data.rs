use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::Url;
use serde::{Deserialize, Serialize};

const P256DH_LENGTH: usize = 65;
const AUTH_SECRET_LENGTH: usize = 16;
const MAX_TOKEN_LENGTH: usize = 4096;

/// What a client registers to receive pushes: either a browser Web Push
/// subscription (`PushSubscription.toJSON()`) or an opaque device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionData {
    WebPush(WebPushSubscription),
    Token { token: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<f64>,
    pub keys: WebPushKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebPushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubscriptionDataError {
    #[error("invalid push endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("push endpoint must use http or https, got `{0}`")]
    UnsupportedScheme(String),

    #[error("invalid `{name}` key: {reason}")]
    InvalidKey { name: &'static str, reason: String },

    #[error("device token must not be empty")]
    EmptyToken,

    #[error("device token is longer than 4096 characters")]
    TokenTooLong,

    #[error("stored subscription data is malformed: {0}")]
    Malformed(String),
}

impl SubscriptionData {
    /// Check what deserialization alone cannot: endpoint shape, key lengths,
    /// non-empty tokens. Tokens are trimmed.
    pub fn validate(self) -> Result<Self, SubscriptionDataError> {
        match self {
            SubscriptionData::WebPush(subscription) => {
                validate_endpoint(&subscription.endpoint)?;
                decode_key("p256dh", &subscription.keys.p256dh, P256DH_LENGTH).and_then(|bytes| {
                    if bytes[0] == 0x04 {
                        Ok(())
                    } else {
                        Err(SubscriptionDataError::InvalidKey {
                            name: "p256dh",
                            reason: "expected an uncompressed P-256 point".into(),
                        })
                    }
                })?;
                decode_key("auth", &subscription.keys.auth, AUTH_SECRET_LENGTH)?;
                Ok(SubscriptionData::WebPush(subscription))
            }
            SubscriptionData::Token { token } => {
                let token = token.trim();
                if token.is_empty() {
                    return Err(SubscriptionDataError::EmptyToken);
                }
                if token.chars().count() > MAX_TOKEN_LENGTH {
                    return Err(SubscriptionDataError::TokenTooLong);
                }
                Ok(SubscriptionData::Token {
                    token: token.to_string(),
                })
            }
        }
    }

    /// Read the `subscription_data` column. Rows written by older clients may
    /// hold a bare token instead of JSON.
    pub fn decode(raw: &str) -> Result<Self, SubscriptionDataError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SubscriptionDataError::Malformed("empty value".into()));
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::String(token)) => Ok(SubscriptionData::Token { token }),
            Ok(value) => serde_json::from_value(value)
                .map_err(|e| SubscriptionDataError::Malformed(e.to_string())),
            Err(_) if !raw.starts_with(['{', '[']) => Ok(SubscriptionData::Token {
                token: raw.to_string(),
            }),
            Err(e) => Err(SubscriptionDataError::Malformed(e.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        // Serializing plain strings and numbers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), SubscriptionDataError> {
    let url = Url::parse(endpoint).map_err(|e| SubscriptionDataError::InvalidEndpoint(e.to_string()))?;
    match url.scheme() {
        "https" | "http" => {}
        other => return Err(SubscriptionDataError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SubscriptionDataError::InvalidEndpoint("missing host".into()));
    }
    Ok(())
}

fn decode_key(name: &'static str, value: &str, expected_length: usize) -> Result<Vec<u8>, SubscriptionDataError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .map_err(|e| SubscriptionDataError::InvalidKey {
            name,
            reason: e.to_string(),
        })?;
    if bytes.len() != expected_length {
        return Err(SubscriptionDataError::InvalidKey {
            name,
            reason: format!("expected {expected_length} bytes, got {}", bytes.len()),
        });
    }
    Ok(bytes)
}
