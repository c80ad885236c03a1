use std::env;
use std::time::Duration;

/// Immutable service configuration, loaded once from the environment
/// and threaded explicitly through the gateway and validators.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub metrics_listen: String,
    pub s3_endpoint: String,
    pub s3_region: String,
    pub s3_access_key_id: String,
    pub s3_secret_access_key: String,
    pub url_ttl: Duration,
    pub max_batch_objects: usize,
    pub probe_timeout: Duration,
    pub basic_auth_username: String,
    pub basic_auth_password: String,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self, String> {
        let backend = BackendConfig::from_env()?;
        let access = AccessConfig::from_env()?;
        let runtime = RuntimeConfig::from_env();
        let config = Self::from_parts(backend, access, runtime);
        config.validate()?;
        Ok(config)
    }

    fn from_parts(backend: BackendConfig, access: AccessConfig, runtime: RuntimeConfig) -> Self {
        Self {
            listen: runtime.listen,
            metrics_listen: runtime.metrics_listen,
            s3_endpoint: backend.endpoint,
            s3_region: backend.region,
            s3_access_key_id: backend.access_key_id,
            s3_secret_access_key: backend.secret_access_key,
            url_ttl: Duration::from_secs(runtime.url_ttl_minutes * 60),
            max_batch_objects: runtime.max_batch_objects,
            probe_timeout: Duration::from_secs(runtime.probe_timeout_seconds),
            basic_auth_username: access.username,
            basic_auth_password: access.password,
            log_level: runtime.log_level,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if !self.s3_endpoint.starts_with("http://") && !self.s3_endpoint.starts_with("https://") {
            return Err("SIGNPOST_S3_ENDPOINT must be an absolute http/https URL".into());
        }
        if url::Url::parse(&self.s3_endpoint).is_err() {
            return Err("SIGNPOST_S3_ENDPOINT must be a valid URL".into());
        }
        if self.url_ttl.is_zero() {
            return Err("SIGNPOST_URL_TTL_MINUTES must be positive".into());
        }
        if self.max_batch_objects == 0 {
            return Err("SIGNPOST_MAX_BATCH_OBJECTS must be positive".into());
        }
        if self.probe_timeout.is_zero() {
            return Err("SIGNPOST_PROBE_TIMEOUT_SECONDS must be positive".into());
        }
        if self.basic_auth_password.trim().is_empty() {
            return Err("SIGNPOST_BASIC_AUTH_PASSWORD must not be empty".into());
        }
        Ok(())
    }
}

struct BackendConfig {
    endpoint: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
}

impl BackendConfig {
    fn from_env() -> Result<Self, String> {
        Ok(Self {
            endpoint: required_env("SIGNPOST_S3_ENDPOINT")?,
            region: required_env("SIGNPOST_S3_REGION")?,
            access_key_id: required_env("SIGNPOST_S3_ACCESS_KEY_ID")?,
            secret_access_key: required_env("SIGNPOST_S3_SECRET_ACCESS_KEY")?,
        })
    }
}

struct AccessConfig {
    username: String,
    password: String,
}

impl AccessConfig {
    fn from_env() -> Result<Self, String> {
        Ok(Self {
            username: required_env("SIGNPOST_BASIC_AUTH_USERNAME")?,
            password: required_env("SIGNPOST_BASIC_AUTH_PASSWORD")?,
        })
    }
}

struct RuntimeConfig {
    listen: String,
    metrics_listen: String,
    url_ttl_minutes: u64,
    max_batch_objects: usize,
    probe_timeout_seconds: u64,
    log_level: String,
}

impl RuntimeConfig {
    fn from_env() -> Self {
        Self {
            listen: normalize_listen_addr(env_or_default("SIGNPOST_LISTEN", ":8080")),
            metrics_listen: normalize_listen_addr(env_or_default(
                "SIGNPOST_METRICS_LISTEN",
                ":9100",
            )),
            url_ttl_minutes: parse_env("SIGNPOST_URL_TTL_MINUTES").unwrap_or(15),
            max_batch_objects: parse_env("SIGNPOST_MAX_BATCH_OBJECTS").unwrap_or(25),
            probe_timeout_seconds: parse_env("SIGNPOST_PROBE_TIMEOUT_SECONDS").unwrap_or(10),
            log_level: env_or_default("SIGNPOST_LOG_LEVEL", "info"),
        }
    }
}

fn required_env(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("{key} is required"))
}

fn env_or_default(key: &str, default_value: &str) -> String {
    env::var(key).unwrap_or_else(|_| default_value.to_string())
}

fn parse_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn normalize_listen_addr(value: String) -> String {
    if value.starts_with(':') {
        format!("0.0.0.0{}", value)
    } else {
        value
    }
}
