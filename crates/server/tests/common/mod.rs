//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router over a temporary SQLite database and
//! a recording announcer, so tests exercise the whole HTTP path without
//! binding a port.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use antrian_core::{
    config::DatabaseConfig, create_notification_system, testing::RecordingAnnouncer, AutoCaller,
    Config, QueueEngine, SqliteChannelStore, SqliteTicketStore,
};

/// Re-export fixtures for test convenience
pub use antrian_core::testing::fixtures;

/// Test fixture for API tests.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_enroll() {
///     let fixture = TestFixture::new().await;
///     fixture.register_channel("umum").await;
///
///     let response = fixture.post("/api/v1/enroll", json!({
///         "channel_id": "umum",
///         "patient_ref": "RM-001"
///     })).await;
///
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Engine behind the router, for direct setup and assertions
    pub engine: Arc<QueueEngine>,
    /// Records every announcement delivered
    pub announcer: Arc<RecordingAnnouncer>,
    pub auto_caller: Option<Arc<AutoCaller>>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default settings.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            engine: fixtures::engine_config(),
            ..Default::default()
        };

        let ticket_store =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));
        let channel_store =
            Arc::new(SqliteChannelStore::new(&db_path).expect("Failed to create channel store"));

        let announcer = Arc::new(RecordingAnnouncer::new());
        let (notifier, worker) = create_notification_system(
            announcer.clone(),
            None,
            64,
            Duration::from_secs(1),
        );
        tokio::spawn(worker.run());

        let engine = Arc::new(QueueEngine::new(
            config.engine.clone(),
            ticket_store,
            channel_store,
            Some(notifier),
        ));

        let auto_caller = if test_config.enable_auto_call {
            let caller = Arc::new(AutoCaller::new(Arc::clone(&engine)));
            caller.start().await;
            Some(caller)
        } else {
            None
        };

        let state = Arc::new(antrian_server::state::AppState::new(
            config,
            Arc::clone(&engine),
            auto_caller.clone(),
        ));
        let router = antrian_server::api::create_router(state);

        Self {
            router,
            engine,
            announcer,
            auto_caller,
            temp_dir,
        }
    }

    /// Register a channel through the API.
    pub async fn register_channel(&self, id: &str) -> TestResponse {
        let code: String = id.to_ascii_uppercase().chars().take(6).collect();
        self.post(
            "/api/v1/channels",
            json!({ "id": id, "code": code, "name": format!("Poli {}", id) }),
        )
        .await
    }

    /// Enroll a patient through the API and return the ticket ID.
    pub async fn enroll(&self, channel_id: &str, patient_ref: &str, tier: &str) -> String {
        let response = self
            .post(
                "/api/v1/enroll",
                json!({
                    "channel_id": channel_id,
                    "patient_ref": patient_ref,
                    "priority_tier": tier,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"]
            .as_str()
            .expect("ticket id in response")
            .to_string()
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };

        TestResponse { status, body }
    }
}

impl Drop for TestFixture {
    fn drop(&mut self) {
        if let Some(caller) = self.auto_caller.take() {
            // Tests that care about shutdown call `stop` themselves.
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { caller.stop().await });
            }
        }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Start the auto-caller
    pub enable_auto_call: bool,
}

impl TestConfig {
    /// Create config with auto-call enabled.
    pub fn with_auto_call() -> Self {
        Self {
            enable_auto_call: true,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
