use crate::s3::errors::FailureReason;
use crate::s3::{Existence, ObjectStore, SignedAccess};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::time::Duration;

/// Upper bound on concurrent backend probes per batch. The fan-out is
/// I/O-bound; the bound keeps one oversized batch from monopolizing the
/// backend connection pool.
const MAX_CONCURRENT_PROBES: usize = 16;

/// A validated access request. Built once by the validator, consumed
/// once by the resolution engine.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub bucket: String,
    pub keys: Vec<String>,
    pub ttl: Duration,
}

/// Final state of one key: a signed URL or the reason it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    Url(String),
    Failed(FailureReason),
}

/// Aggregate result of resolving a batch. `Aggregated` covers every
/// requested key exactly once; `ShortCircuited` means a fatal reason
/// aborted the batch and all per-key results were discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    ShortCircuited(FailureReason),
    Aggregated(BTreeMap<String, KeyOutcome>),
}

/// Decode transport-encoded spaces in an object key. Every occurrence
/// of `%20` and `+` becomes a literal space; the output contains
/// neither trigger sequence, so the transform is idempotent.
pub fn normalize_key(raw: &str) -> String {
    raw.replace("%20", " ").replace('+', " ")
}

/// Resolve a batch: probe every key concurrently, short-circuit on a
/// fatal reason, then sign the surviving keys concurrently and
/// aggregate one entry per requested key.
pub async fn resolve_batch(store: &dyn ObjectStore, request: &AccessRequest) -> BatchOutcome {
    let bucket = request.bucket.as_str();
    let checks = stream::iter(request.keys.iter().cloned())
        .map(|key| async move {
            let existence = store.check_exists(bucket, &key).await;
            (key, existence)
        })
        .buffer_unordered(MAX_CONCURRENT_PROBES)
        .collect::<Vec<(String, Existence)>>()
        .await;

    if let Some(reason) = first_fatal_check(&checks) {
        return BatchOutcome::ShortCircuited(reason);
    }

    let mut resolved = BTreeMap::new();
    let mut verified = Vec::new();
    for (key, existence) in checks {
        match existence {
            Existence::Present => verified.push(key),
            Existence::Absent(reason) => {
                resolved.insert(key, KeyOutcome::Failed(reason));
            }
        }
    }

    let ttl = request.ttl;
    let signed = stream::iter(verified.into_iter())
        .map(|key| async move {
            let access = store.presign_get(bucket, &key, ttl).await;
            (key, access)
        })
        .buffer_unordered(MAX_CONCURRENT_PROBES)
        .collect::<Vec<(String, SignedAccess)>>()
        .await;

    // Permissions and relocation failures mean the same thing at
    // signing time as they do at probe time: the batch cannot proceed.
    if let Some(reason) = first_fatal_signing(&signed) {
        return BatchOutcome::ShortCircuited(reason);
    }

    for (key, access) in signed {
        let outcome = match access {
            SignedAccess::Url(url) => KeyOutcome::Url(url),
            SignedAccess::Failure(reason) => KeyOutcome::Failed(reason),
        };
        resolved.insert(key, outcome);
    }
    BatchOutcome::Aggregated(resolved)
}

/// Single-object mode: the batch machine with one key. Any failure,
/// per-key or fatal, collapses to an immediate failure.
pub async fn resolve_single(store: &dyn ObjectStore, request: &AccessRequest) -> KeyOutcome {
    let Some(key) = request.keys.first().cloned() else {
        return KeyOutcome::Failed(FailureReason::Unknown);
    };
    match resolve_batch(store, request).await {
        BatchOutcome::ShortCircuited(reason) => KeyOutcome::Failed(reason),
        BatchOutcome::Aggregated(mut resolved) => resolved
            .remove(&key)
            .unwrap_or(KeyOutcome::Failed(FailureReason::Unknown)),
    }
}

fn first_fatal_check(checks: &[(String, Existence)]) -> Option<FailureReason> {
    checks.iter().find_map(|(_, existence)| match existence {
        Existence::Absent(reason) if reason.is_fatal() => Some(*reason),
        _ => None,
    })
}

fn first_fatal_signing(signed: &[(String, SignedAccess)]) -> Option<FailureReason> {
    signed.iter().find_map(|(_, access)| match access {
        SignedAccess::Failure(reason) if reason.is_fatal() => Some(*reason),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::{normalize_key, resolve_batch, resolve_single, BatchOutcome, KeyOutcome};
    use crate::s3::errors::FailureReason;
    use crate::test_support::ScriptedStore;
    use std::sync::atomic::Ordering;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn normalize_key_decodes_all_encoded_spaces() {
        assert_eq!(normalize_key("a%20b%20c"), "a b c");
        assert_eq!(normalize_key("a+b"), "a b");
        assert_eq!(normalize_key("a+b+c"), "a b c");
        assert_eq!(normalize_key("a%20b+c"), "a b c");
        assert_eq!(normalize_key("plain"), "plain");
    }

    #[test]
    fn normalize_key_is_idempotent() {
        for raw in ["a%20b%20c", "a+b", "%20+", "no-spaces", "%2%200"] {
            let once = normalize_key(raw);
            assert_eq!(normalize_key(&once), once);
        }
    }

    #[tokio::test]
    async fn batch_with_all_present_keys_signs_every_key() {
        let store = ScriptedStore::new();
        let request = store.request("bucket", keys(&["a", "b", "c"]));
        let outcome = resolve_batch(&store, &request).await;
        let BatchOutcome::Aggregated(resolved) = outcome else {
            panic!("expected aggregate");
        };
        assert_eq!(resolved.len(), 3);
        for key in ["a", "b", "c"] {
            assert_eq!(
                resolved.get(key),
                Some(&KeyOutcome::Url(format!(
                    "https://signed.example/bucket/{key}"
                )))
            );
        }
        assert_eq!(store.check_calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.presign_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_key_is_recorded_while_others_resolve() {
        let store = ScriptedStore::new().with_absent("gone", FailureReason::NotFound);
        let request = store.request("bucket", keys(&["a", "gone", "b"]));
        let outcome = resolve_batch(&store, &request).await;
        let BatchOutcome::Aggregated(resolved) = outcome else {
            panic!("expected aggregate");
        };
        assert_eq!(resolved.len(), 3);
        assert_eq!(
            resolved.get("gone"),
            Some(&KeyOutcome::Failed(FailureReason::NotFound))
        );
        assert!(matches!(resolved.get("a"), Some(KeyOutcome::Url(_))));
        assert!(matches!(resolved.get("b"), Some(KeyOutcome::Url(_))));
        // only the two present keys get signed
        assert_eq!(store.presign_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_check_reason_short_circuits_before_signing() {
        for reason in [
            FailureReason::Forbidden,
            FailureReason::Moved,
            FailureReason::Unknown,
        ] {
            let store = ScriptedStore::new().with_absent("bad", reason);
            let request = store.request("bucket", keys(&["a", "bad", "b"]));
            let outcome = resolve_batch(&store, &request).await;
            assert_eq!(outcome, BatchOutcome::ShortCircuited(reason));
            assert_eq!(store.check_calls.load(Ordering::SeqCst), 3);
            assert_eq!(store.presign_calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn malformed_check_reason_stays_per_key() {
        let store = ScriptedStore::new().with_absent("odd", FailureReason::Malformed);
        let request = store.request("bucket", keys(&["odd", "a"]));
        let outcome = resolve_batch(&store, &request).await;
        let BatchOutcome::Aggregated(resolved) = outcome else {
            panic!("expected aggregate");
        };
        assert_eq!(
            resolved.get("odd"),
            Some(&KeyOutcome::Failed(FailureReason::Malformed))
        );
        assert!(matches!(resolved.get("a"), Some(KeyOutcome::Url(_))));
    }

    #[tokio::test]
    async fn signing_stage_fatal_reason_short_circuits() {
        let store = ScriptedStore::new().with_signing_failure("a", FailureReason::Forbidden);
        let request = store.request("bucket", keys(&["a", "b"]));
        let outcome = resolve_batch(&store, &request).await;
        assert_eq!(
            outcome,
            BatchOutcome::ShortCircuited(FailureReason::Forbidden)
        );
    }

    #[tokio::test]
    async fn signing_stage_local_failure_is_recorded_per_key() {
        let store = ScriptedStore::new().with_signing_failure("a", FailureReason::NotFound);
        let request = store.request("bucket", keys(&["a", "b"]));
        let outcome = resolve_batch(&store, &request).await;
        let BatchOutcome::Aggregated(resolved) = outcome else {
            panic!("expected aggregate");
        };
        assert_eq!(
            resolved.get("a"),
            Some(&KeyOutcome::Failed(FailureReason::NotFound))
        );
        assert!(matches!(resolved.get("b"), Some(KeyOutcome::Url(_))));
    }

    #[tokio::test]
    async fn aggregation_is_independent_of_completion_order() {
        // later keys complete first; the keyed aggregate must not care
        let names: Vec<String> = (0..8).map(|index| format!("key-{index}")).collect();
        let mut store = ScriptedStore::new();
        for (index, name) in names.iter().enumerate() {
            store = store.with_delay(name, 5 * (names.len() - index) as u64);
        }
        let request = store.request("bucket", names.clone());
        let outcome = resolve_batch(&store, &request).await;
        let BatchOutcome::Aggregated(resolved) = outcome else {
            panic!("expected aggregate");
        };
        assert_eq!(resolved.len(), names.len());
        for name in &names {
            assert_eq!(
                resolved.get(name),
                Some(&KeyOutcome::Url(format!(
                    "https://signed.example/bucket/{name}"
                )))
            );
        }
    }

    #[tokio::test]
    async fn aggregate_covers_requested_key_set_exactly() {
        let store = ScriptedStore::new().with_absent("gone", FailureReason::NotFound);
        let requested = keys(&["x", "gone", "y", "z"]);
        let request = store.request("bucket", requested.clone());
        let outcome = resolve_batch(&store, &request).await;
        let BatchOutcome::Aggregated(resolved) = outcome else {
            panic!("expected aggregate");
        };
        let mut expected: Vec<&str> = requested.iter().map(String::as_str).collect();
        expected.sort_unstable();
        let actual: Vec<&str> = resolved.keys().map(String::as_str).collect();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn single_resolves_to_url_when_present() {
        let store = ScriptedStore::new();
        let request = store.request("bucket", keys(&["photo.png"]));
        let outcome = resolve_single(&store, &request).await;
        assert_eq!(
            outcome,
            KeyOutcome::Url("https://signed.example/bucket/photo.png".to_string())
        );
    }

    #[tokio::test]
    async fn single_fails_immediately_for_missing_object() {
        let store = ScriptedStore::new().with_absent("gone", FailureReason::NotFound);
        let request = store.request("bucket", keys(&["gone"]));
        let outcome = resolve_single(&store, &request).await;
        assert_eq!(outcome, KeyOutcome::Failed(FailureReason::NotFound));
        assert_eq!(store.presign_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_surfaces_fatal_reasons() {
        let store = ScriptedStore::new().with_absent("secret", FailureReason::Forbidden);
        let request = store.request("bucket", keys(&["secret"]));
        let outcome = resolve_single(&store, &request).await;
        assert_eq!(outcome, KeyOutcome::Failed(FailureReason::Forbidden));
    }

    #[tokio::test]
    async fn single_with_no_keys_reports_unknown() {
        let store = ScriptedStore::new();
        let request = store.request("bucket", Vec::new());
        let outcome = resolve_single(&store, &request).await;
        assert_eq!(outcome, KeyOutcome::Failed(FailureReason::Unknown));
    }
}
