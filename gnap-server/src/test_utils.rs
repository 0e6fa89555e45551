use crate::config::Settings;
use crate::create_app;
use crate::gnap::{GnapConfig, INTERACT_PATH};
use crate::interaction::RedirectInteraction;
use crate::policy::RulePolicy;
use crate::state::AppState;
use crate::store::{
    create_store_provider, Backend, ReplaceOutcome, Store, StoreBackend, StoreError,
    StoreProvider,
};
use axum::body::Body;
use axum::Router;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tower::ServiceExt;

/// Error returned by [`FailingStoreProvider`], recognisable through `source()` chains
#[derive(Debug, Error)]
#[error("expected test failure")]
pub struct ExpectedError;

/// Store provider whose collections can never be opened
pub struct FailingStoreProvider;

#[async_trait::async_trait]
impl StoreProvider for FailingStoreProvider {
    async fn open_store(&self, name: &str) -> Result<Store, StoreError> {
        Err(StoreError::Open {
            name: name.to_string(),
            source: Box::new(ExpectedError),
        })
    }
}

/// What [`FaultyStore`] does with `set` calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Writes go through
    Pass,
    /// Every `set` fails with a backend error
    Fail,
    /// Every `set` goes through after the delay
    Delay(Duration),
}

/// Mutating call seen by a [`FaultyStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub op: &'static str,
    pub key: String,
    /// TTL passed to `set`
    pub ttl: Option<Duration>,
}

/// Shared handle on the [`FaultyStore`] collections of one provider: the
/// fault they apply and the writes they received
#[derive(Debug, Clone)]
pub struct StoreControl {
    fault: Arc<Mutex<WriteFault>>,
    writes: Arc<Mutex<Vec<Write>>>,
}

impl StoreControl {
    fn new(fault: WriteFault) -> Self {
        Self {
            fault: Arc::new(Mutex::new(fault)),
            writes: Arc::default(),
        }
    }

    /// Changes the fault applied to subsequent writes
    pub fn set_fault(&self, fault: WriteFault) {
        if let Ok(mut current) = self.fault.lock() {
            *current = fault;
        }
    }

    fn fault(&self) -> WriteFault {
        self.fault
            .lock()
            .map(|fault| *fault)
            .unwrap_or(WriteFault::Pass)
    }

    fn record(&self, op: &'static str, key: &str, ttl: Option<Duration>) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(Write {
                op,
                key: key.to_string(),
                ttl,
            });
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    /// `set` calls on keys starting with `prefix`
    pub fn sets(&self, prefix: &str) -> Vec<Write> {
        self.writes()
            .into_iter()
            .filter(|write| write.op == "set" && write.key.starts_with(prefix))
            .collect()
    }
}

/// In-memory store that logs every write and can break `set`
#[derive(Clone)]
pub struct FaultyStore {
    inner: Arc<Store>,
    control: StoreControl,
}

#[async_trait::async_trait]
impl StoreBackend for FaultyStore {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.control.record("set", key, ttl);
        match self.control.fault() {
            WriteFault::Pass => {}
            WriteFault::Fail => return Err(StoreError::Redis("connection reset".to_string())),
            WriteFault::Delay(delay) => tokio::time::sleep(delay).await,
        }
        self.inner.set(key, value, ttl).await
    }

    async fn get<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.inner.get(key).await
    }

    async fn take<T: DeserializeOwned + Send + Sync>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        self.control.record("take", key, None);
        self.inner.take(key).await
    }

    async fn replace<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<ReplaceOutcome, StoreError> {
        self.control.record("replace", key, None);
        self.inner.replace(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.control.record("delete", key, None);
        self.inner.delete(key).await
    }

    async fn health_check(&self) -> Result<(), String> {
        self.inner.health_check().await
    }
}

/// Provider handing out [`FaultyStore`] collections driven by one [`StoreControl`]
pub struct FaultyStoreProvider {
    pub control: StoreControl,
}

#[async_trait::async_trait]
impl StoreProvider for FaultyStoreProvider {
    async fn open_store(&self, name: &str) -> Result<Store, StoreError> {
        let settings = Settings::for_test();
        let inner = create_store_provider(&settings.store)?
            .open_store(name)
            .await?;
        let store = FaultyStore {
            inner: Arc::new(inner),
            control: self.control.clone(),
        };
        Ok(Store::new(
            Backend::Faulty(store),
            Duration::from_millis(settings.store.op_timeout_ms),
        ))
    }
}

/// Operation configuration whose store applies `fault` and logs every write
pub fn faulty_gnap_config(policy: RulePolicy, fault: WriteFault) -> (GnapConfig, StoreControl) {
    let control = StoreControl::new(fault);
    let mut config = test_gnap_config(policy);
    config.store_provider = Arc::new(FaultyStoreProvider {
        control: control.clone(),
    });
    (config, control)
}

/// Operation configuration backed by an in-memory store and the test settings
pub fn test_gnap_config(policy: RulePolicy) -> GnapConfig {
    let settings = Settings::for_test();
    let interaction = RedirectInteraction::new(
        &settings.base_url,
        INTERACT_PATH,
        &settings.interaction.ui_url,
    )
    .expect("Failed to build test interaction handler");

    GnapConfig {
        store_provider: create_store_provider(&settings.store)
            .expect("Failed to create test store provider"),
        access_policy: Arc::new(policy),
        base_url: settings.base_url.clone(),
        interaction_handler: Arc::new(interaction),
        interaction: settings.interaction,
        token: settings.token,
    }
}

/// Test fixture driving the full application router.
///
/// Requests go through the same middleware and handlers as in production,
/// without binding a socket.
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.post_raw("/gnap/introspect", "{}", &[]).await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub settings: Settings,
    callback_header: String,
}

impl TestFixture {
    /// Creates a fixture from [`Settings::for_test`]
    pub async fn new() -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let settings = Settings::for_test();
        let state = AppState::new(settings.clone())
            .await
            .expect("Failed to create test state");
        let app = create_app(state).await;
        let callback_header = format!("Bearer {}", settings.interaction.callback_secret);

        Self {
            app,
            settings,
            callback_header,
        }
    }

    /// Initializes the test logger; later calls are no-ops
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Authorization header accepted by the interaction completion callback
    pub fn callback_auth(&self) -> [(&str, &str); 1] {
        [("Authorization", self.callback_header.as_str())]
    }

    /// Creates a request builder with a JSON content type
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    /// Sends a GET request to the specified URI
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a raw body and extra headers.
    ///
    /// Raw bodies let tests send empty or malformed JSON.
    pub async fn post_raw(
        &self,
        uri: impl AsRef<str>,
        body: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = self.request_builder(Method::POST, uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = builder
            .body(Body::from(body.to_string()))
            .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        TestResponse {
            status,
            headers,
            json,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}
