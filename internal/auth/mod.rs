use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine;

/// Credential lookup behind the basic-auth gate. A trait so the
/// statically configured pair can be swapped for another backing store
/// without touching call sites.
pub trait CredentialStore: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// The single configured credential pair.
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }
}

impl CredentialStore for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        username_ok && password_ok
    }
}

/// Check the request's `Authorization: Basic` header against the
/// credential store. Missing or malformed headers are a plain deny.
pub fn authorize(store: &dyn CredentialStore, headers: &HeaderMap) -> bool {
    match decode_basic_header(headers) {
        Some((username, password)) => store.verify(&username, &password),
        None => false,
    }
}

fn decode_basic_header(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = Base64.decode(encoded.as_bytes()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let mut diff = left.len() ^ right.len();
    let max_len = left.len().max(right.len());
    let mut index = 0usize;
    while index < max_len {
        let left_byte = left.get(index).copied().unwrap_or(0);
        let right_byte = right.get(index).copied().unwrap_or(0);
        diff |= (left_byte ^ right_byte) as usize;
        index += 1;
    }
    diff == 0
}
