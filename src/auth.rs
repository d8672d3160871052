//! Bearer-token identity for the dashboard's users.
//!
//! The hosted auth service signs HS256 JWTs with the project secret; the `sub`
//! claim is the account's UUID.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::configuration::AuthSettings;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authentication token")]
    MissingToken,

    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("invalid token signature: {0}")]
    InvalidSignature(String),

    #[error("token has expired")]
    Expired,

    #[error("invalid audience")]
    InvalidAudience,

    #[error("token subject is not a user id")]
    InvalidSubject,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::warn!("Rejected request: {}", self);
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, serde::Deserialize)]
struct Claims {
    sub: String,
}

/// A caller whose token checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

#[derive(Clone)]
pub struct TokenValidator {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(settings: &AuthSettings) -> Self {
        let key = DecodingKey::from_secret(settings.jwt_secret.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        Self {
            key: Arc::new(key),
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature(e.to_string()),
            _ => AuthError::InvalidFormat(e.to_string()),
        })?;
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidSubject)?;
        Ok(AuthenticatedUser { user_id })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts.headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;
    let header = header
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("authorization header is not ASCII".into()))?;
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::InvalidFormat("expected `Bearer <token>`".into())),
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    TokenValidator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let validator = TokenValidator::from_ref(state);
        validator.validate(bearer_token(parts)?)
    }
}
