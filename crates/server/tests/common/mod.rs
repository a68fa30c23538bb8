//! Common test utilities for in-process API testing with mocks.
//!
//! The fixture wires the real dispatcher, task queue, workers and SQLite
//! store together, with only the inference service mocked, so a submission
//! posted to the router is graded end to end.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use gradeflow_core::{
    testing::MockInferenceClient, Aggregator, Config, DatabaseConfig, Dispatcher, GradingConfig,
    GradingWorker, InMemoryTaskQueue, InferenceClient, InferenceConfig, ProblemCatalog,
    QueueConfig, RubricAdvisor, SqliteTicketStore, SubtaskHandler, TaskQueue, TicketStore,
    TicketUpdateCallback,
};
use gradeflow_server::api::{create_router, WsBroadcaster};
use gradeflow_server::state::AppState;

/// Re-export fixtures for test convenience
pub use gradeflow_core::testing::fixtures;

/// Test fixture for API testing with a mock inference service.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/tickets", json!({
///         "problem_id": "Q001",
///         "submission_ref": "gs://bucket/answer.png"
///     })).await;
///
///     assert_eq!(response.status, StatusCode::ACCEPTED);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock inference - configure answers and failures per role
    pub inference: Arc<MockInferenceClient>,
    /// The running task queue
    pub queue: Arc<InMemoryTaskQueue>,
    /// Broadcaster the grading components report to
    pub ws_broadcaster: WsBroadcaster,
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
    /// Create a new test fixture with the default problem catalog.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let inference = Arc::new(MockInferenceClient::new());

        let queue_config = QueueConfig {
            min_backoff_secs: 0,
            max_backoff_secs: 0,
            enqueue_backoff_ms: 1,
            ..Default::default()
        };

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            queue: queue_config.clone(),
            inference: InferenceConfig {
                api_key: Some("sk-test-secret".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let ticket_store: Arc<dyn TicketStore> = Arc::new(
            SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"),
        );
        let catalog: Arc<dyn ProblemCatalog> = Arc::new(fixtures::catalog());
        let inference_client: Arc<dyn InferenceClient> = inference.clone();

        let ws_broadcaster = WsBroadcaster::default();
        let broadcaster_for_callback = ws_broadcaster.clone();
        let update_callback: TicketUpdateCallback =
            Arc::new(move |ticket_id: &str, event: &str| {
                broadcaster_for_callback.ticket_updated(ticket_id, event);
            });

        let grading = GradingConfig::default();
        let aggregator = Arc::new(
            Aggregator::new(
                Arc::clone(&ticket_store),
                Arc::clone(&inference_client),
                &grading,
            )
            .with_update_callback(Arc::clone(&update_callback)),
        );
        let worker = GradingWorker::new(
            Arc::clone(&ticket_store),
            Arc::clone(&catalog),
            Arc::clone(&inference_client),
            aggregator,
            grading.clone(),
        )
        .with_update_callback(Arc::clone(&update_callback));

        let queue = Arc::new(InMemoryTaskQueue::new(queue_config.clone()));
        let handler: Arc<dyn SubtaskHandler> = Arc::new(worker);
        queue.start(handler);

        let task_queue: Arc<dyn TaskQueue> = queue.clone();
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&ticket_store), task_queue, &queue_config)
                .with_update_callback(update_callback),
        );
        let rubric_advisor = Arc::new(RubricAdvisor::new(inference_client, grading));

        let state = Arc::new(AppState::new(
            config,
            ticket_store,
            catalog,
            dispatcher,
            Arc::clone(&queue),
            rubric_advisor,
            ws_broadcaster.clone(),
        ));

        Self {
            router: create_router(state),
            inference,
            queue,
            ws_broadcaster,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
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

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Poll a ticket until it leaves `processing`, returning its final body.
    pub async fn wait_for_terminal(&self, ticket_id: &str) -> Value {
        let path = format!("/api/v1/tickets/{}", ticket_id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            if response.body["status"] != "processing" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("ticket {} did not leave processing", ticket_id);
    }

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
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
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

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
