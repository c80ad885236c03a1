use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const HEAD_SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// Signs outbound requests against one S3-compatible endpoint with a
/// fixed credential pair and region.
#[derive(Clone)]
pub struct RequestSigner {
    endpoint: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

/// A HEAD probe ready to send: the object URL plus the headers the
/// signature covers.
pub struct SignedHead {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
}

impl RequestSigner {
    pub fn new(
        endpoint: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
    ) -> Self {
        Self {
            endpoint,
            region,
            access_key_id,
            secret_access_key,
        }
    }

    /// Build a presigned GET URL valid for `expires_seconds`.
    pub fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        expires_seconds: i64,
    ) -> Result<String, String> {
        self.presign_get_at(bucket, key, expires_seconds, Utc::now())
    }

    fn presign_get_at(
        &self,
        bucket: &str,
        key: &str,
        expires_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<String, String> {
        let timestamps = RequestTimestamps::new(now, &self.region);
        let (mut url, path, host) = build_object_url(&self.endpoint, bucket, key)?;
        let mut params = self.presign_params(expires_seconds, &timestamps);
        params.sort();
        let canonical_query = encode_query_pairs(&params);
        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\n{}",
            canonical_uri(&path),
            canonical_query,
            host,
            UNSIGNED_PAYLOAD
        );
        let signature = self.sign_canonical_request(&timestamps, &canonical_request)?;
        params.push(("X-Amz-Signature".to_string(), signature));
        url.set_query(Some(&encode_query_pairs(&params)));
        Ok(url.to_string())
    }

    /// Build a header-signed HEAD request for an existence probe.
    pub fn signed_head(&self, bucket: &str, key: &str) -> Result<SignedHead, String> {
        self.signed_head_at(bucket, key, Utc::now())
    }

    fn signed_head_at(
        &self,
        bucket: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedHead, String> {
        let timestamps = RequestTimestamps::new(now, &self.region);
        let (url, path, host) = build_object_url(&self.endpoint, bucket, key)?;
        let payload_hash = empty_payload_hash();
        let canonical_headers = format!(
            "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
            host, payload_hash, timestamps.amz_date
        );
        let canonical_request = format!(
            "HEAD\n{}\n\n{}\n{}\n{}",
            canonical_uri(&path),
            canonical_headers,
            HEAD_SIGNED_HEADERS,
            payload_hash
        );
        let signature = self.sign_canonical_request(&timestamps, &canonical_request)?;
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key_id, timestamps.credential_scope, HEAD_SIGNED_HEADERS, signature
        );
        Ok(SignedHead {
            url: url.to_string(),
            headers: vec![
                ("x-amz-date", timestamps.amz_date),
                ("x-amz-content-sha256", payload_hash),
                ("authorization", authorization),
            ],
        })
    }

    fn presign_params(
        &self,
        expires_seconds: i64,
        timestamps: &RequestTimestamps,
    ) -> Vec<(String, String)> {
        vec![
            ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
            (
                "X-Amz-Credential".to_string(),
                format!("{}/{}", self.access_key_id, timestamps.credential_scope),
            ),
            ("X-Amz-Date".to_string(), timestamps.amz_date.clone()),
            ("X-Amz-Expires".to_string(), expires_seconds.to_string()),
            ("X-Amz-SignedHeaders".to_string(), "host".to_string()),
            (
                "X-Amz-Content-Sha256".to_string(),
                UNSIGNED_PAYLOAD.to_string(),
            ),
        ]
    }

    fn sign_canonical_request(
        &self,
        timestamps: &RequestTimestamps,
        canonical_request: &str,
    ) -> Result<String, String> {
        let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = build_string_to_sign(
            &timestamps.amz_date,
            &timestamps.credential_scope,
            &canonical_hash,
        );
        calculate_signature(
            &self.secret_access_key,
            &timestamps.credential_scope,
            &string_to_sign,
        )
    }
}

struct RequestTimestamps {
    amz_date: String,
    credential_scope: String,
}

impl RequestTimestamps {
    fn new(now: DateTime<Utc>, region: &str) -> Self {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
        Self {
            amz_date,
            credential_scope,
        }
    }
}

fn build_object_url(
    endpoint: &str,
    bucket: &str,
    key: &str,
) -> Result<(url::Url, String, String), String> {
    let mut url = url::Url::parse(endpoint).map_err(|_| "invalid endpoint".to_string())?;
    let path = format!("/{}/{}", bucket, key);
    url.set_path(&path);
    let host = url
        .host_str()
        .ok_or_else(|| "invalid endpoint".to_string())?;
    let host = if let Some(port) = url.port() {
        format!("{}:{}", host, port)
    } else {
        host.to_string()
    };
    Ok((url, path, host))
}

fn build_string_to_sign(amz_date: &str, scope: &str, canonical_hash: &str) -> String {
    format!("{}\n{}\n{}\n{}", ALGORITHM, amz_date, scope, canonical_hash)
}

fn calculate_signature(
    secret: &str,
    credential_scope: &str,
    string_to_sign: &str,
) -> Result<String, String> {
    let scope_parts: Vec<&str> = credential_scope.split('/').collect();
    if scope_parts.len() < 4 {
        return Err("invalid credential scope".to_string());
    }
    let date = scope_parts[0];
    let region = scope_parts[1];
    let service = scope_parts[2];
    if date.is_empty() || region.is_empty() || service.is_empty() {
        return Err("invalid credential scope".to_string());
    }

    let mut key = sign(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    key = sign(&key, region.as_bytes());
    key = sign(&key, service.as_bytes());
    key = sign(&key, b"aws4_request");

    Ok(hex::encode(sign(&key, string_to_sign.as_bytes())))
}

fn sign(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

fn empty_payload_hash() -> String {
    hex::encode(Sha256::digest(b""))
}

fn canonical_uri(path: &str) -> String {
    let segments = path.split('/').map(encode).collect::<Vec<String>>();
    let mut out = segments.join("/");
    if !out.starts_with('/') {
        out.insert(0, '/');
    }
    out
}

fn encode_query_pairs(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", encode(key), encode(value)))
        .collect::<Vec<String>>()
        .join("&")
}

fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        match *byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
