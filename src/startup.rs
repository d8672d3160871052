use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::TokenValidator;
use crate::configuration::{PushSettings, Settings};
use crate::dispatch::NotificationDispatcher;
use crate::push_client::{PushSender, VapidKey, WebPushClient};
use crate::routes::{
    health_check::health_check,
    notifications::send_notification,
    push_subscriptions::{register, unsubscribe, vapid_public_key},
};
use crate::store::{DatabaseSubscriptionStore, SubscriptionStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SubscriptionStore>,
    pub dispatcher: NotificationDispatcher,
    pub tokens: TokenValidator,
    pub vapid_public_key: Option<String>,
}

impl AppState {
    pub fn new(store: Arc<dyn SubscriptionStore>, push_client: Option<WebPushClient>, tokens: TokenValidator) -> Self {
        let vapid_public_key = push_client.as_ref().map(|c| c.vapid_key().public_key().to_string());
        let sender = push_client.map(|c| Arc::new(c) as Arc<dyn PushSender>);
        Self {
            dispatcher: NotificationDispatcher::new(store.clone(), sender),
            store,
            tokens,
            vapid_public_key,
        }
    }
}

impl FromRef<AppState> for TokenValidator {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// `None` when no VAPID key is configured: registration keeps working, sending fails.
pub fn build_push_client(settings: &PushSettings) -> anyhow::Result<Option<WebPushClient>> {
    let Some(private_key) = &settings.vapid_private_key else {
        tracing::warn!("No VAPID private key configured, push delivery is disabled");
        return Ok(None);
    };
    let vapid_key = VapidKey::from_base64(private_key, settings.vapid_subject.clone())?;
    Ok(Some(WebPushClient::new(vapid_key, settings)?))
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    allowed_origins: Vec<String>,
}

impl Application {
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let db = Database::connect(settings.database.connect_options()).await?;
        Migrator::up(&db, None).await?;

        let store = Arc::new(DatabaseSubscriptionStore::new(db));
        let push_client = build_push_client(&settings.push)?;
        let state = AppState::new(store, push_client, TokenValidator::new(&settings.auth));

        let address = format!("{}:{}", settings.application.host, settings.application.port);
        let listener = TcpListener::bind(&address).await?;
        let port = listener.local_addr()?.port();
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            port,
            listener,
            state,
            allowed_origins: settings.application.allowed_origins,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        run(self.listener, self.state, &self.allowed_origins).await
    }
}

pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health_check", get(health_check))
        .route("/push/vapid_public_key", get(vapid_public_key))
        .route("/push/subscriptions", post(register).delete(unsubscribe))
        .route("/push/notifications", post(send_notification))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
}

pub async fn run(listener: TcpListener, state: AppState, allowed_origins: &[String]) -> std::io::Result<()> {
    axum::serve(listener, router(state, allowed_origins)).await
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| tracing::warn!("Ignoring invalid CORS origin {}: {}", origin, e))
                .ok()
        }))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}
