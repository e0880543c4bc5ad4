//! Storage Module Tests
//!
//! Validates the versioned store and its HTTP surface.
//!
//! ## Test Scopes
//! - **Key validation**: Allowed alphabet and symbol set.
//! - **Aggregate rules**: Versioning, replace and shallow-merge semantics.
//! - **VersionedStore**: CAS guard, snapshot isolation, concurrency and cancellation.
//! - **Handlers**: Status codes and bodies of the node API.

#[cfg(test)]
mod tests {
    use crate::storage::error::StoreError;
    use crate::storage::handlers::{NodeState, router};
    use crate::storage::locks::KeyLockCoordinator;
    use crate::storage::memory::VersionedStore;
    use crate::storage::protocol::{ErrorBody, KeyValueRecord};
    use crate::storage::types::{Aggregate, Mutation, shallow_merge, validate_key};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    // ============================================================
    // KEY VALIDATION TESTS
    // ============================================================

    #[test]
    fn test_validate_key_accepts_alphanumeric_and_symbols() {
        for key in [
            "key",
            "Key123",
            "key:value",
            "key@value",
            "user:123:profile",
            "key-value_pair=test@domain.com#tag",
            "a*b,c",
            "v1.2",
            "...x",
        ] {
            assert!(validate_key(key).is_ok(), "{} should be valid", key);
        }
    }

    #[test]
    fn test_validate_key_rejects_empty_whitespace_and_foreign_chars() {
        for key in [
            "",
            "   ",
            "has space",
            "slash/key",
            "ключ",
            "semi;colon",
            "tab\tkey",
            ".",
            "..",
            "...",
        ] {
            assert_eq!(
                validate_key(key),
                Err(StoreError::InvalidKey {
                    key: key.to_string()
                }),
                "{:?} should be invalid",
                key
            );
        }
    }

    // ============================================================
    // AGGREGATE TESTS
    // ============================================================

    #[test]
    fn test_aggregate_create_starts_at_version_one() {
        let aggregate = Aggregate::create("k", Mutation::Replace(json!({"a": 1})));

        assert_eq!(aggregate.version(), 1);
        assert_eq!(aggregate.value(), &json!({"a": 1}));
    }

    #[test]
    fn test_aggregate_mismatch_leaves_state_unchanged() {
        let mut aggregate = Aggregate::create("k", Mutation::Replace(json!("original")));

        let result = aggregate.apply(Mutation::Replace(json!("changed")), Some(5));

        assert_eq!(
            result,
            Err(StoreError::VersionMismatch {
                key: "k".to_string(),
                expected: 5,
                actual: 1
            })
        );
        assert_eq!(aggregate.value(), &json!("original"));
        assert_eq!(aggregate.version(), 1);
    }

    #[test]
    fn test_shallow_merge_adds_and_preserves_fields() {
        let merged = shallow_merge(&json!({"name": "Ari", "points": 10}), json!({"rank": "gold"}));

        assert_eq!(merged, json!({"name": "Ari", "points": 10, "rank": "gold"}));
    }

    #[test]
    fn test_shallow_merge_replaces_nested_objects_wholesale() {
        let merged = shallow_merge(
            &json!({"profile": {"city": "Oslo", "zip": "0150"}, "age": 30}),
            json!({"profile": {"city": "Bergen"}}),
        );

        assert_eq!(merged, json!({"profile": {"city": "Bergen"}, "age": 30}));
    }

    #[test]
    fn test_shallow_merge_non_object_sides_replace() {
        assert_eq!(shallow_merge(&json!({"name": "Ari"}), json!(123)), json!(123));
        assert_eq!(shallow_merge(&json!([1, 2]), json!({"a": 1})), json!({"a": 1}));
        assert_eq!(shallow_merge(&json!("text"), json!([3])), json!([3]));
    }

    // ============================================================
    // VERSIONED STORE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let store = VersionedStore::new();

        assert_eq!(
            store.get("missing"),
            Err(StoreError::NotFound {
                key: "missing".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_first_put_and_first_patch_create_version_one() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        let put = store.put("a", json!(1), None, &cancel).await.unwrap();
        let patch = store
            .patch("b", json!({"x": 1}), None, &cancel)
            .await
            .unwrap();

        assert_eq!(put.version, 1);
        assert_eq!(patch.version, 1);
        assert_eq!(patch.value, json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_put_replaces_value_and_increments_version() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        store
            .put("user", json!({"name": "Ari", "points": 10}), None, &cancel)
            .await
            .unwrap();
        let record = store
            .put("user", json!({"name": "Bo"}), None, &cancel)
            .await
            .unwrap();

        assert_eq!(record.version, 2);
        assert_eq!(record.value, json!({"name": "Bo"}));
        assert_eq!(store.get("user").unwrap(), record);
    }

    #[tokio::test]
    async fn test_put_accepts_null_value() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        let record = store.put("n", Value::Null, None, &cancel).await.unwrap();

        assert_eq!(record.value, Value::Null);
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_conditional_write_succeeds_only_on_current_version() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        store.put("k", json!("v1"), None, &cancel).await.unwrap();
        store.put("k", json!("v2"), Some(1), &cancel).await.unwrap();

        let stale = store.put("k", json!("v3"), Some(1), &cancel).await;
        assert_eq!(
            stale,
            Err(StoreError::VersionMismatch {
                key: "k".to_string(),
                expected: 1,
                actual: 2
            })
        );

        let stale_patch = store.patch("k", json!({"a": 1}), Some(7), &cancel).await;
        assert!(matches!(
            stale_patch,
            Err(StoreError::VersionMismatch { actual: 2, .. })
        ));

        let current = store.get("k").unwrap();
        assert_eq!(current.value, json!("v2"));
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn test_if_version_zero_creates_absent_key_only() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        let created = store.put("fresh", json!(1), Some(0), &cancel).await.unwrap();
        assert_eq!(created.version, 1);

        let again = store.put("fresh", json!(2), Some(0), &cancel).await;
        assert!(matches!(
            again,
            Err(StoreError::VersionMismatch {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_non_zero_expectation_on_absent_key_reports_zero() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        for result in [
            store.put("ghost", json!(1), Some(3), &cancel).await,
            store.patch("ghost", json!({"a": 1}), Some(3), &cancel).await,
        ] {
            assert_eq!(
                result,
                Err(StoreError::VersionMismatch {
                    key: "ghost".to_string(),
                    expected: 3,
                    actual: 0
                })
            );
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_patch_merges_object_delta() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        store
            .put("player", json!({"name": "Ari", "points": 10}), None, &cancel)
            .await
            .unwrap();
        let record = store
            .patch("player", json!({"rank": "gold"}), Some(1), &cancel)
            .await
            .unwrap();

        assert_eq!(record.value, json!({"name": "Ari", "points": 10, "rank": "gold"}));
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_patch_with_scalar_delta_replaces() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        store
            .put("player", json!({"name": "Ari"}), None, &cancel)
            .await
            .unwrap();
        let record = store.patch("player", json!(123), None, &cancel).await.unwrap();

        assert_eq!(record.value, json!(123));
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_patch_null_delta_is_invalid_payload() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        let result = store.patch("k", Value::Null, None, &cancel).await;

        assert!(matches!(result, Err(StoreError::InvalidPayload(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_key_rejected_before_any_write() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        let result = store.put("bad key", json!(1), None, &cancel).await;
        assert!(matches!(result, Err(StoreError::InvalidKey { .. })));

        for key in [".", ".."] {
            let put = store.put(key, json!(1), None, &cancel).await;
            let patch = store.patch(key, json!({"a": 1}), None, &cancel).await;
            assert!(matches!(put, Err(StoreError::InvalidKey { .. })), "{}", key);
            assert!(matches!(patch, Err(StoreError::InvalidKey { .. })), "{}", key);
        }

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_do_not_alias_stored_state() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        let mut returned = store
            .put("doc", json!({"tags": ["a"]}), None, &cancel)
            .await
            .unwrap();
        returned.value["tags"] = json!(["mutated"]);

        let mut read = store.get("doc").unwrap();
        read.value["extra"] = json!(true);

        assert_eq!(store.get("doc").unwrap().value, json!({"tags": ["a"]}));
    }

    #[tokio::test]
    async fn test_list_keys_returns_sorted_keys() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();

        for key in ["c", "a", "b"] {
            store.put(key, json!(key), None, &cancel).await.unwrap();
        }

        assert_eq!(store.list_keys(), vec!["a", "b", "c"]);
    }

    // ============================================================
    // CONCURRENCY & CANCELLATION
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_unconditional_puts_produce_every_version_once() {
        let store = Arc::new(VersionedStore::new());
        let writers = 50;

        let mut handles = Vec::new();
        for i in 0..writers {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                store.put("hot", json!(i), None, &cancel).await.unwrap().version
            }));
        }

        let mut versions = HashSet::new();
        for handle in handles {
            assert!(versions.insert(handle.await.unwrap()), "duplicate version");
        }

        let expected: HashSet<u64> = (1..=writers).collect();
        assert_eq!(versions, expected);
        assert_eq!(store.get("hot").unwrap().version, writers);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cas_increment_loops_lose_no_updates() {
        let store = Arc::new(VersionedStore::new());
        let cancel = CancellationToken::new();
        store.put("counter", json!(0), None, &cancel).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for _ in 0..100 {
                    loop {
                        let current = store.get("counter").unwrap();
                        let next = current.value.as_i64().unwrap() + 1;
                        match store
                            .put("counter", json!(next), Some(current.version), &cancel)
                            .await
                        {
                            Ok(_) => break,
                            Err(StoreError::VersionMismatch { .. }) => {
                                tokio::task::yield_now().await;
                            }
                            Err(e) => panic!("unexpected error: {}", e),
                        }
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get("counter").unwrap();
        assert_eq!(record.value, json!(300));
        assert_eq!(record.version, 301);
    }

    #[tokio::test]
    async fn test_cancelled_write_has_no_effect() {
        let store = VersionedStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let put = store.put("k", json!(1), None, &cancel).await;
        let patch = store.patch("k", json!({"a": 1}), None, &cancel).await;

        assert_eq!(put, Err(StoreError::Cancelled));
        assert_eq!(patch, Err(StoreError::Cancelled));
        assert!(store.get("k").is_err());
    }

    #[tokio::test]
    async fn test_lock_coordinator_creates_one_lock_per_key() {
        let locks = KeyLockCoordinator::new();
        let cancel = CancellationToken::new();

        for key in ["a", "b", "a", "c", "b"] {
            locks.run_exclusive(key, "test", &cancel, || ()).await.unwrap();
        }

        assert_eq!(locks.tracked_keys(), 3);
    }

    #[tokio::test]
    async fn test_lock_coordinator_skips_action_when_cancelled() {
        let locks = KeyLockCoordinator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ran = false;

        let result = locks.run_exclusive("k", "test", &cancel, || ran = true).await;

        assert_eq!(result, Err(StoreError::Cancelled));
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_held_lock_does_not_block_other_keys() {
        let locks = KeyLockCoordinator::new();
        let cancel = CancellationToken::new();
        let _held = locks.acquire("k", "test", &cancel).await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            locks.run_exclusive("other", "test", &cancel, || 7),
        )
        .await;

        assert_eq!(other.expect("other key must not wait"), Ok(7));
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_held_lock_skips_action() {
        let locks = Arc::new(KeyLockCoordinator::new());
        let held = locks
            .acquire("k", "test", &CancellationToken::new())
            .await
            .unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let waiter = {
            let locks = locks.clone();
            let ran = ran.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                locks
                    .run_exclusive("k", "test", &cancel, || ran.store(true, Ordering::SeqCst))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "waiter must block behind the held lock");

        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), Err(StoreError::Cancelled));
        assert!(!ran.load(Ordering::SeqCst));

        drop(held);
        let after = locks
            .run_exclusive("k", "test", &CancellationToken::new(), || 1)
            .await;
        assert_eq!(after, Ok(1));
    }

    #[tokio::test]
    async fn test_waiters_on_same_key_run_in_arrival_order() {
        let locks = Arc::new(KeyLockCoordinator::new());
        let cancel = CancellationToken::new();
        let held = locks.acquire("k", "test", &cancel).await.unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for i in 0..5 {
            let locks = locks.clone();
            let order = order.clone();
            let cancel = cancel.clone();
            waiters.push(tokio::spawn(async move {
                locks
                    .run_exclusive("k", "test", &cancel, || order.lock().unwrap().push(i))
                    .await
            }));
            // Let the waiter enqueue before the next one starts.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(held);
        for waiter in waiters {
            waiter.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    // ============================================================
    // HANDLER TESTS
    // ============================================================

    fn test_app() -> axum::Router {
        router(NodeState {
            store: Arc::new(VersionedStore::new()),
            shutdown: CancellationToken::new(),
        })
    }

    async fn send(
        app: &axum::Router,
        method: &str,
        uri: &str,
        body: &str,
    ) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_handler_put_then_get_round_trip() {
        let app = test_app();

        let (status, body) = send(&app, "PUT", "/kv/user:1", r#"{"name":"Ari"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let put: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(put, json!({"Key": "user:1", "Value": {"name": "Ari"}, "Version": 1}));

        let (status, body) = send(&app, "GET", "/kv/user:1", "").await;
        assert_eq!(status, StatusCode::OK);
        let record: KeyValueRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_handler_get_missing_is_404() {
        let app = test_app();

        let (status, body) = send(&app, "GET", "/kv/nothing", "").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorBody = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("nothing"));
    }

    #[tokio::test]
    async fn test_handler_version_mismatch_is_409() {
        let app = test_app();

        send(&app, "PUT", "/kv/k", "1").await;
        let (status, _) = send(&app, "PUT", "/kv/k?ifVersion=5", "2").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "PATCH", "/kv/k?ifVersion=1", r#"{"a":1}"#).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_handler_rejects_bad_payloads_and_keys() {
        let app = test_app();

        let (status, _) = send(&app, "PUT", "/kv/k", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "PATCH", "/kv/k", "null").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "PATCH", "/kv/k", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "PUT", "/kv/bad%20key", "1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_handler_malformed_if_version_is_json_400() {
        let app = test_app();

        for (method, uri) in [("PUT", "/kv/k?ifVersion=abc"), ("PATCH", "/kv/k?ifVersion=-1")] {
            let (status, body) = send(&app, method, uri, r#"{"a":1}"#).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
            let error: ErrorBody = serde_json::from_slice(&body).unwrap();
            assert!(error.error.contains("query string"), "{}", error.error);
        }

        let (status, _) = send(&app, "GET", "/kv/k", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handler_lists_keys() {
        let app = test_app();

        send(&app, "PUT", "/kv/b", "1").await;
        send(&app, "PUT", "/kv/a", "2").await;

        let (status, body) = send(&app, "GET", "/kv", "").await;
        assert_eq!(status, StatusCode::OK);
        let keys: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
