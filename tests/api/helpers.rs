use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
};
use equipecho_push::{
    configuration::get_configuration,
    domain::{SubscriptionData, WebPushKeys, WebPushSubscription},
    entities::push_subscriptions,
    startup::Application,
    store::{DatabaseSubscriptionStore, PushSubscription, SubscriptionStore},
    telemetry::{get_subscriber, init_subscriber},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use once_cell::sync::Lazy;
use sea_orm::{Database, DatabaseConnection, EntityTrait, PaginatorTrait};
use secrecy::SecretString;
use tempfile::TempDir;
use tokio::net::TcpListener;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration-test-jwt-secret-0123456789abcdef";
pub const VAPID_PRIVATE_KEY: &str = "lbwp2tZPr4cuyftluanVlBhB71Hfs3KyoPcDvi3rcr0";
pub const VAPID_PUBLIC_KEY: &str =
    "BH9ZK13z1IeWQmO7u-lgdFYNOxJteTd1r6X2qdqMtoS-p81w7I03bvlLHYG5h_24Z5lzGzWdRl6Yx6D3BHv-saM";
pub const P256DH: &str =
    "BEoEtd8VBDVKjHaYNSZxm-_vsRSuAPHkpc6Meh2W8g5KJP3x96dPA1Cof3OrkkC1utjnculp4ZYoOgc8Fp1r4pw";
pub const AUTH: &str = "kODIs55MuongBHO1gLjzUg";

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    // TEST_LOG=true prints logs; otherwise they go to a sink.
    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber).expect("Failed to initialise tracing.");
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber).expect("Failed to initialise tracing.");
    }
});

/// Stand-in for a browser vendor's push service. Every endpoint is
/// `/push/{name}`; answers 201 unless told otherwise.
#[derive(Clone, Default)]
struct MockPushState {
    responses: Arc<Mutex<HashMap<String, u16>>>,
    received: Arc<Mutex<Vec<ReceivedPush>>>,
}

#[derive(Debug, Clone)]
pub struct ReceivedPush {
    pub name: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub struct MockPushService {
    pub address: String,
    state: MockPushState,
}

impl MockPushService {
    async fn start() -> Self {
        let state = MockPushState::default();
        let app = Router::new()
            .route("/push/{name}", post(receive_push))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock push service.");
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });
        Self { address, state }
    }

    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/push/{}", self.address, name)
    }

    pub fn respond_with(&self, name: &str, status: u16) {
        self.state.responses.lock().unwrap().insert(name.to_string(), status);
    }

    pub fn received(&self) -> Vec<ReceivedPush> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn received_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.received().into_iter().map(|p| p.name).collect();
        names.sort();
        names
    }
}

async fn receive_push(
    State(state): State<MockPushState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let status = state.responses.lock().unwrap().get(&name).copied().unwrap_or(201);
    state.received.lock().unwrap().push(ReceivedPush {
        name,
        headers,
        body: body.to_vec(),
    });
    StatusCode::from_u16(status).unwrap_or(StatusCode::CREATED)
}

pub struct TestApp {
    pub address: String,
    pub db: DatabaseConnection,
    pub store: DatabaseSubscriptionStore,
    pub push_service: MockPushService,
    pub api_client: reqwest::Client,
    _database_directory: TempDir,
}

impl TestApp {
    pub fn token_for(&self, user_id: Uuid) -> String {
        #[derive(serde::Serialize)]
        struct Claims {
            sub: String,
            exp: i64,
            role: &'static str,
        }
        encode(
            &Header::default(),
            &Claims {
                sub: user_id.to_string(),
                exp: chrono::Utc::now().timestamp() + 3600,
                role: "authenticated",
            },
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign test token.")
    }

    pub fn web_push_body(&self, name: &str) -> serde_json::Value {
        serde_json::json!({
            "endpoint": self.push_service.endpoint(name),
            "expirationTime": null,
            "keys": { "p256dh": P256DH, "auth": AUTH }
        })
    }

    pub async fn post_subscription(&self, token: Option<&str>, body: &serde_json::Value) -> reqwest::Response {
        let mut request = self
            .api_client
            .post(format!("{}/push/subscriptions", self.address))
            .json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    pub async fn delete_subscription(&self, token: &str) -> reqwest::Response {
        self.api_client
            .delete(format!("{}/push/subscriptions", self.address))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_notification(&self, token: Option<&str>, body: &serde_json::Value) -> reqwest::Response {
        let mut request = self
            .api_client
            .post(format!("{}/push/notifications", self.address))
            .json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request.send().await.expect("Failed to execute request.")
    }

    /// Store a Web Push subscription for `user_id` pointing at the mock push service.
    pub async fn seed_subscription(&self, user_id: Uuid, name: &str) -> PushSubscription {
        let data = SubscriptionData::WebPush(WebPushSubscription {
            endpoint: self.push_service.endpoint(name),
            expiration_time: None,
            keys: WebPushKeys {
                p256dh: P256DH.into(),
                auth: AUTH.into(),
            },
        });
        self.store
            .upsert_subscription(user_id, &data)
            .await
            .expect("Failed to seed subscription.")
    }

    pub async fn subscription_count(&self) -> u64 {
        push_subscriptions::Entity::find()
            .count(&self.db)
            .await
            .expect("Failed to count subscriptions.")
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_vapid_key(Some(VAPID_PRIVATE_KEY)).await
}

pub async fn spawn_app_with_vapid_key(vapid_private_key: Option<&str>) -> TestApp {
    // Initialised on first use only.
    Lazy::force(&TRACING);

    let database_directory = TempDir::new().expect("Failed to create database directory.");
    let database_url = format!(
        "sqlite://{}?mode=rwc",
        database_directory.path().join("push.db").display()
    );

    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration.");
        c.database.url = Some(SecretString::from(database_url.clone()));
        c.application.port = 0;
        c.push.vapid_private_key = vapid_private_key.map(SecretString::from);
        c.auth.jwt_secret = SecretString::from(JWT_SECRET);
        c.auth.audience = None;
        c
    };

    let application = Application::build(configuration)
        .await
        .expect("Failed to build application.");
    let address = format!("http://127.0.0.1:{}", application.port());
    let _ = tokio::spawn(application.run_until_stopped());

    let db = Database::connect(database_url)
        .await
        .expect("Failed to connect to the test database.");
    let push_service = MockPushService::start().await;

    TestApp {
        address,
        store: DatabaseSubscriptionStore::new(db.clone()),
        db,
        push_service,
        api_client: reqwest::Client::builder().no_proxy().build().unwrap(),
        _database_directory: database_directory,
    }
}
