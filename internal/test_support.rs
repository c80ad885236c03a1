use crate::api::AppState;
use crate::auth::StaticCredentials;
use crate::obs::Metrics;
use crate::resolve::AccessRequest;
use crate::s3::errors::FailureReason;
use crate::s3::{Existence, ObjectStore, SignedAccess};
use crate::util::config::Config;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_USERNAME: &str = "gateway";
pub const TEST_PASSWORD: &str = "super-secret";

/// Scriptable `ObjectStore` double: per-key outcomes, per-key delays
/// for completion-order scrambling, and call counters for the
/// no-backend-call assertions.
#[derive(Default)]
pub struct ScriptedStore {
    absent: HashMap<String, FailureReason>,
    signing_failures: HashMap<String, FailureReason>,
    delays_ms: HashMap<String, u64>,
    pub check_calls: AtomicUsize,
    pub presign_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_absent(mut self, key: &str, reason: FailureReason) -> Self {
        self.absent.insert(key.to_string(), reason);
        self
    }

    pub fn with_signing_failure(mut self, key: &str, reason: FailureReason) -> Self {
        self.signing_failures.insert(key.to_string(), reason);
        self
    }

    pub fn with_delay(mut self, key: &str, millis: u64) -> Self {
        self.delays_ms.insert(key.to_string(), millis);
        self
    }

    pub fn request(&self, bucket: &str, keys: Vec<String>) -> AccessRequest {
        AccessRequest {
            bucket: bucket.to_string(),
            keys,
            ttl: Duration::from_secs(900),
        }
    }

    async fn apply_delay(&self, key: &str) {
        if let Some(millis) = self.delays_ms.get(key) {
            tokio::time::sleep(Duration::from_millis(*millis)).await;
        }
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn check_exists(&self, _bucket: &str, key: &str) -> Existence {
        self.apply_delay(key).await;
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        match self.absent.get(key) {
            Some(reason) => Existence::Absent(*reason),
            None => Existence::Present,
        }
    }

    async fn presign_get(&self, bucket: &str, key: &str, _ttl: Duration) -> SignedAccess {
        self.apply_delay(key).await;
        self.presign_calls.fetch_add(1, Ordering::SeqCst);
        match self.signing_failures.get(key) {
            Some(reason) => SignedAccess::Failure(*reason),
            None => SignedAccess::Url(format!("https://signed.example/{bucket}/{key}")),
        }
    }
}

pub fn base_config() -> Config {
    base_config_with_endpoint("http://localhost:9000")
}

pub fn base_config_with_endpoint(endpoint: &str) -> Config {
    Config {
        listen: "127.0.0.1:0".to_string(),
        metrics_listen: "127.0.0.1:0".to_string(),
        s3_endpoint: endpoint.to_string(),
        s3_region: "us-east-1".to_string(),
        s3_access_key_id: "AKIDEXAMPLE".to_string(),
        s3_secret_access_key: "test-secret".to_string(),
        url_ttl: Duration::from_secs(900),
        max_batch_objects: 25,
        probe_timeout: Duration::from_secs(2),
        basic_auth_username: TEST_USERNAME.to_string(),
        basic_auth_password: TEST_PASSWORD.to_string(),
        log_level: "info".to_string(),
    }
}

pub fn build_state(store: Arc<dyn ObjectStore>) -> AppState {
    build_state_with_config(store, base_config())
}

pub fn build_state_with_config(store: Arc<dyn ObjectStore>, config: Config) -> AppState {
    let credentials = Arc::new(StaticCredentials::new(
        config.basic_auth_username.clone(),
        config.basic_auth_password.clone(),
    ));
    AppState {
        config,
        store,
        credentials,
        metrics: Metrics::new(),
    }
}

/// Value for an `Authorization` header accepted by the test state.
pub fn basic_auth_header() -> String {
    basic_auth_header_for(TEST_USERNAME, TEST_PASSWORD)
}

pub fn basic_auth_header_for(username: &str, password: &str) -> String {
    use base64::engine::general_purpose::STANDARD as Base64;
    use base64::Engine;
    format!(
        "Basic {}",
        Base64.encode(format!("{username}:{password}").as_bytes())
    )
}
