//! Policy loading and the shared policy cache.

mod common;

use appspawn_sandbox::test_utils::SandboxFixture;
use appspawn_sandbox::{PolicyStore, SandboxError};
use common::EMPTY_ON;
use std::sync::Arc;

// ============= Loading =============

/// Test: a policy file on disk is parsed and cached
#[test]
fn test_load_file_stores_policy() {
    let fixture = SandboxFixture::new().unwrap();
    let path = fixture.write_policy_file(EMPTY_ON).unwrap();

    fixture.store.load_file(&path).unwrap();
    assert!(fixture.store.get().unwrap().sandbox_switch);
}

/// Test: a broken file on disk does not replace the cached policy
#[test]
fn test_broken_file_keeps_previous_policy() {
    let fixture = SandboxFixture::with_policy(EMPTY_ON).unwrap();
    let path = fixture
        .write_policy_file(r#"{ "sandbox-switch": false, "common": [] , "private": {} }"#)
        .unwrap();

    let err = fixture.store.load_file(&path).unwrap_err();
    assert!(matches!(err, SandboxError::PolicyParse { .. }));
    assert!(fixture.store.get().unwrap().sandbox_switch);
}

/// Test: truncated JSON is a parse error, not a panic
#[test]
fn test_truncated_json() {
    let store = PolicyStore::new();
    let err = store.store_json(r#"{ "sandbox-switch": true, "common": {"#).unwrap_err();
    assert!(matches!(err, SandboxError::PolicyParse { .. }));
    assert!(matches!(store.get(), Err(SandboxError::NotLoaded)));
}

// ============= Sharing =============

/// Test: the global store is one instance per process
#[test]
fn test_global_store_is_shared() {
    assert!(Arc::ptr_eq(&PolicyStore::global(), &PolicyStore::global()));
}

/// Test: readers keep working while the policy is replaced underneath them
#[test]
fn test_concurrent_readers_during_reload() {
    let store = Arc::new(PolicyStore::new());
    store.store_json(EMPTY_ON).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let store = store.clone();
            scope.spawn(move || {
                for _ in 0..500 {
                    let policy = store.get().unwrap();
                    assert!(policy.common.mount_paths.is_empty());
                }
            });
        }
        scope.spawn(|| {
            for i in 0..100 {
                let json = format!(
                    r#"{{ "sandbox-switch": {}, "common": {{}}, "private": {{}} }}"#,
                    i % 2 == 0
                );
                store.store_json(&json).unwrap();
            }
        });
    });

    assert!(store.is_loaded());
}
