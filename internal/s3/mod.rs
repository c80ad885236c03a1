use crate::s3::errors::{classify_probe_status, FailureReason};
use crate::s3::sigv4::RequestSigner;
use crate::util::config::Config;
use async_trait::async_trait;
use std::time::Duration;

pub mod errors;
pub mod sigv4;

/// Per-key result of an existence probe. Failures are carried as
/// values; the gateway never raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Present,
    Absent(FailureReason),
}

/// Per-key result of requesting a signed retrieval URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedAccess {
    Url(String),
    Failure(FailureReason),
}

/// Gateway over the storage backend's existence-check and URL-signing
/// operations. Both calls are independent per key and safe to issue
/// concurrently against the same backend handle.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn check_exists(&self, bucket: &str, key: &str) -> Existence;

    async fn presign_get(&self, bucket: &str, key: &str, ttl: Duration) -> SignedAccess;
}

/// Production gateway: SigV4-signed HEAD probes plus locally computed
/// presigned GET URLs against one S3-compatible endpoint.
pub struct S3Client {
    http: reqwest::Client,
    signer: RequestSigner,
}

impl S3Client {
    pub fn new(config: &Config) -> Result<Self, String> {
        // A bucket relocation must surface as a 301, not be followed.
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|_| "failed to build storage http client".to_string())?;
        let signer = RequestSigner::new(
            config.s3_endpoint.clone(),
            config.s3_region.clone(),
            config.s3_access_key_id.clone(),
            config.s3_secret_access_key.clone(),
        );
        Ok(Self { http, signer })
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn check_exists(&self, bucket: &str, key: &str) -> Existence {
        let head = match self.signer.signed_head(bucket, key) {
            Ok(head) => head,
            Err(error) => {
                tracing::error!(bucket, key, %error, "failed to sign existence probe");
                return Existence::Absent(FailureReason::Unknown);
            }
        };
        let mut request = self.http.head(&head.url);
        for (name, value) in &head.headers {
            request = request.header(*name, value);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => Existence::Present,
            Ok(response) => {
                let status = axum::http::StatusCode::from_u16(response.status().as_u16())
                    .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
                Existence::Absent(classify_probe_status(status))
            }
            Err(error) => {
                tracing::warn!(bucket, key, %error, "existence probe failed");
                Existence::Absent(FailureReason::Unknown)
            }
        }
    }

    async fn presign_get(&self, bucket: &str, key: &str, ttl: Duration) -> SignedAccess {
        match self.signer.presign_get(bucket, key, ttl.as_secs() as i64) {
            Ok(url) => SignedAccess::Url(url),
            Err(error) => {
                tracing::error!(bucket, key, %error, "failed to presign object url");
                SignedAccess::Failure(FailureReason::Unknown)
            }
        }
    }
}
