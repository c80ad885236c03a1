use crate::api::AppState;
use crate::auth;
use crate::resolve::{self, AccessRequest, BatchOutcome, KeyOutcome};
use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const BODY_LIMIT: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(root_handler))
        .route("/{*path}", any(path_handler))
        .with_state(state)
}

async fn root_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let response = match authorize_request(&state, &headers) {
        Ok(()) => message_response(StatusCode::BAD_REQUEST, "bucket name required"),
        Err(denied) => denied,
    };
    record_access_request(&state, method.as_str(), response.status());
    response
}

async fn path_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let response = dispatch_path_request(&state, &path, &method, &headers, body).await;
    record_access_request(&state, method.as_str(), response.status());
    response
}

async fn dispatch_path_request(
    state: &AppState,
    path: &str,
    method: &Method,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    if let Err(denied) = authorize_request(state, headers) {
        return denied;
    }
    let (bucket, key) = split_bucket_key(path);
    if bucket.is_empty() {
        return message_response(StatusCode::BAD_REQUEST, "bucket name required");
    }
    match *method {
        Method::GET => handle_get_object(state, &bucket, key.as_deref()).await,
        Method::POST => handle_post_batch(state, &bucket, body).await,
        _ => message_response(
            StatusCode::BAD_REQUEST,
            "only GET and POST requests are supported",
        ),
    }
}

fn authorize_request(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    if auth::authorize(state.credentials.as_ref(), headers) {
        Ok(())
    } else {
        Err(message_response(
            StatusCode::UNAUTHORIZED,
            "invalid credentials",
        ))
    }
}

fn split_bucket_key(path: &str) -> (String, Option<String>) {
    let trimmed = path.trim_start_matches('/');
    let mut parts = trimmed.splitn(2, '/');
    let bucket = parts.next().unwrap_or("").to_string();
    let key = parts
        .next()
        .filter(|rest| !rest.is_empty())
        .map(ToString::to_string);
    (bucket, key)
}

/// Single-object mode: the one-key degenerate batch. Any failure
/// becomes an immediate error response.
async fn handle_get_object(state: &AppState, bucket: &str, key: Option<&str>) -> Response {
    let Some(key) = key else {
        return message_response(StatusCode::BAD_REQUEST, "object key required");
    };
    let request = AccessRequest {
        bucket: bucket.to_string(),
        keys: vec![resolve::normalize_key(key)],
        ttl: state.config.url_ttl,
    };
    match resolve::resolve_single(state.store.as_ref(), &request).await {
        KeyOutcome::Url(url) => data_response(Value::String(url)),
        KeyOutcome::Failed(reason) => message_response(reason.status(), reason.message()),
    }
}

#[derive(Deserialize)]
struct BatchBody {
    objects: Option<Vec<String>>,
}

async fn handle_post_batch(state: &AppState, bucket: &str, body: Body) -> Response {
    let keys = match read_batch_keys(state, body).await {
        Ok(keys) => keys,
        Err(rejected) => return rejected,
    };
    state.metrics.batch_objects.observe(keys.len() as f64);
    let request = AccessRequest {
        bucket: bucket.to_string(),
        keys,
        ttl: state.config.url_ttl,
    };
    match resolve::resolve_batch(state.store.as_ref(), &request).await {
        BatchOutcome::ShortCircuited(reason) => message_response(reason.status(), reason.message()),
        BatchOutcome::Aggregated(resolved) => {
            let mut data = Map::new();
            for (key, outcome) in resolved {
                let value = match outcome {
                    KeyOutcome::Url(url) => Value::String(url),
                    KeyOutcome::Failed(reason) => Value::String(reason.message().to_string()),
                };
                data.insert(key, value);
            }
            data_response(Value::Object(data))
        }
    }
}

/// Validate the batch body and normalize its keys. The size ceiling is
/// enforced here, before any backend call is issued.
async fn read_batch_keys(state: &AppState, body: Body) -> Result<Vec<String>, Response> {
    let bytes = to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|_| message_response(StatusCode::BAD_REQUEST, "objects required"))?;
    let parsed: BatchBody = serde_json::from_slice(&bytes)
        .map_err(|_| message_response(StatusCode::BAD_REQUEST, "objects required"))?;
    let objects = parsed
        .objects
        .filter(|objects| !objects.is_empty())
        .ok_or_else(|| message_response(StatusCode::BAD_REQUEST, "objects required"))?;
    let max = state.config.max_batch_objects;
    if objects.len() > max {
        return Err(message_response(
            StatusCode::BAD_REQUEST,
            &format!("we can only process {max} objects at a time"),
        ));
    }
    Ok(objects
        .iter()
        .map(|key| resolve::normalize_key(key))
        .collect())
}

fn data_response(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "data": data }))).into_response()
}

fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn record_access_request(state: &AppState, method: &str, status: StatusCode) {
    let status_label = status.as_u16().to_string();
    state
        .metrics
        .access_requests
        .with_label_values(&[method, &status_label])
        .inc();
}
