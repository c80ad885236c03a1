use axum::http::StatusCode;

/// Closed taxonomy of per-object access failures. Every backend error
/// signal collapses into one of these before it reaches the resolution
/// engine, so the engine's control flow is driven by tags alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NotFound,
    Forbidden,
    Moved,
    Malformed,
    Unknown,
}

impl FailureReason {
    pub fn status(&self) -> StatusCode {
        match self {
            FailureReason::NotFound => StatusCode::NOT_FOUND,
            FailureReason::Forbidden => StatusCode::FORBIDDEN,
            FailureReason::Moved => StatusCode::MOVED_PERMANENTLY,
            FailureReason::Malformed => StatusCode::BAD_REQUEST,
            FailureReason::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            FailureReason::NotFound => "The specified object does not exist, verify the key",
            FailureReason::Forbidden => "Access to this bucket or object is denied",
            FailureReason::Moved => "The bucket has been relocated to another region",
            FailureReason::Malformed => "The storage backend rejected the request",
            FailureReason::Unknown => "Unexpected storage backend error",
        }
    }

    /// A fatal reason invalidates the whole batch: broken credentials,
    /// a relocated bucket, or a malfunctioning backend apply to every
    /// key, not just the one that surfaced them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FailureReason::Forbidden | FailureReason::Moved | FailureReason::Unknown
        )
    }
}

/// Translate a backend probe status into the taxonomy. Total over all
/// statuses; anything unrecognized is `Unknown`.
pub fn classify_probe_status(status: StatusCode) -> FailureReason {
    match status.as_u16() {
        404 => FailureReason::NotFound,
        403 => FailureReason::Forbidden,
        301 => FailureReason::Moved,
        400 => FailureReason::Malformed,
        _ => FailureReason::Unknown,
    }
}
