use crate::auth::{CredentialStore, StaticCredentials};
use crate::obs::{Metrics, MetricsLayer};
use crate::s3::{ObjectStore, S3Client};
use crate::util::config::Config;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub mod access;

/// Shared per-process state: immutable configuration, the long-lived
/// backend gateway, the credential store and the metrics registry.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ObjectStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, String> {
        let store: Arc<dyn ObjectStore> = Arc::new(S3Client::new(&config)?);
        let credentials: Arc<dyn CredentialStore> = Arc::new(StaticCredentials::new(
            config.basic_auth_username.clone(),
            config.basic_auth_password.clone(),
        ));
        Ok(Self {
            config,
            store,
            credentials,
            metrics: Metrics::new(),
        })
    }
}

pub struct Servers {
    handles: Vec<JoinHandle<()>>,
}

impl Servers {
    pub async fn run_all(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

pub fn build_servers(state: AppState) -> Result<Servers, String> {
    let mut handles = Vec::new();

    let access_app =
        access::router(state.clone()).layer(MetricsLayer::new(state.metrics.clone(), "access"));
    handles.push(spawn_server(&state.config.listen, access_app)?);

    let metrics_app =
        metrics_router(state.clone()).layer(MetricsLayer::new(state.metrics.clone(), "metrics"));
    handles.push(spawn_server(&state.config.metrics_listen, metrics_app)?);

    Ok(Servers { handles })
}

fn spawn_server(addr: &str, app: Router) -> Result<JoinHandle<()>, String> {
    let socket: SocketAddr = addr
        .parse()
        .map_err(|_| format!("invalid listen addr {addr}"))?;
    let handle = tokio::spawn(async move {
        let listener = match TcpListener::bind(socket).await {
            Ok(val) => val,
            Err(_) => return,
        };
        let _ = axum::serve(listener, app).await;
    });
    Ok(handle)
}

fn metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    let _ = encoder.encode(&state.metrics.gather(), &mut buffer);
    String::from_utf8_lossy(&buffer).to_string()
}

#[cfg(test)]
mod tests {
    use super::{build_servers, metrics_handler, metrics_router, spawn_server, Servers};
    use crate::test_support::{self, ScriptedStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;
    use tokio::time::{sleep, Duration};
    use tower::ServiceExt;

    #[tokio::test]
    async fn build_servers_rejects_invalid_listen() {
        let mut state = test_support::build_state(Arc::new(ScriptedStore::new()));
        state.config.listen = "invalid".to_string();
        let err = build_servers(state).err().expect("err");
        assert!(err.contains("invalid listen addr"));
    }

    #[tokio::test]
    async fn build_servers_rejects_invalid_metrics_listen() {
        let mut state = test_support::build_state(Arc::new(ScriptedStore::new()));
        state.config.metrics_listen = "invalid".to_string();
        let err = build_servers(state).err().expect("err");
        assert!(err.contains("invalid listen addr"));
    }

    #[tokio::test]
    async fn build_servers_starts_both_listeners() {
        let state = test_support::build_state(Arc::new(ScriptedStore::new()));
        let servers = build_servers(state).expect("servers");
        assert_eq!(servers.handles.len(), 2);
        sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn metrics_router_healthz_returns_ok() {
        let state = test_support::build_state(Arc::new(ScriptedStore::new()));
        let app = metrics_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/healthz")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_handler_returns_payload() {
        let state = test_support::build_state(Arc::new(ScriptedStore::new()));
        state
            .metrics
            .access_requests
            .with_label_values(&["GET", "200"])
            .inc();
        let body = metrics_handler(axum::extract::State(state)).await;
        assert!(body.contains("signpost_access_requests_total"));
    }

    #[tokio::test]
    async fn servers_run_all_waits_for_handles() {
        let handle = tokio::spawn(async {});
        let servers = Servers {
            handles: vec![handle],
        };
        servers.run_all().await;
    }

    #[tokio::test]
    async fn spawn_server_binds_and_serves_requests() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let app = Router::new().route("/healthz", get(|| async { "ok" }));
        let handle = spawn_server(&addr.to_string(), app).expect("spawn");
        sleep(Duration::from_millis(50)).await;
        let response = reqwest::get(format!("http://{}/healthz", addr))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        handle.abort();
    }

    #[tokio::test]
    async fn spawn_server_handles_in_use_port() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = Router::new().route("/healthz", get(|| async { "ok" }));
        let handle = spawn_server(&addr.to_string(), app).expect("spawn");
        sleep(Duration::from_millis(50)).await;
        handle.abort();
        drop(listener);
    }
}
