//! End-to-end sandbox construction against a temporary device tree.

mod common;

use appspawn_common::ConstructionState;
use appspawn_sandbox::mounter::{ApplyOutcome, MountCall};
use appspawn_sandbox::test_utils::{SandboxFixture, init_test_logging};
use appspawn_sandbox::{SandboxError, SandboxMode};
use common::{app, applied_destinations, private_app};
use nix::errno::Errno;
use nix::mount::MsFlags;
use std::fs;

// ============= Specified scenarios =============

/// Test: one private data mount for `demo` lands at `<root>/data`
#[test]
fn test_scenario_private_data_mount() {
    init_test_logging();
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {},
             "private": { "mount-paths": [ { "source": "data", "target": "data" } ] } }"#,
    )
    .unwrap();
    let data = fixture.package_dir(100, "demo", "data").unwrap();
    let engine = fixture.engine();

    let construction = engine.construct_detailed(&app("demo")).unwrap();
    let root = fixture.config.install_root.join("100/sandbox/demo");

    assert_eq!(construction.root.as_path(), root);
    assert!(root.is_dir());
    assert!(root.join("data").is_dir());
    assert_eq!(
        engine.syscalls().calls(),
        vec![MountCall {
            source: Some(data),
            target: root.join("data"),
            flags: MsFlags::MS_BIND,
        }]
    );
    assert_eq!(
        construction.history,
        vec![
            ConstructionState::Idle,
            ConstructionState::RootReady,
            ConstructionState::CommonApplied,
            ConstructionState::PrivateApplied,
            ConstructionState::Done,
        ]
    );
}

/// Test: an install entry with an empty `links` array plans and creates nothing
#[test]
fn test_scenario_empty_install_links() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "private": {},
             "common": { "install": [ { "source": "hnp/tools", "target": "/bin", "links": [] } ] } }"#,
    )
    .unwrap();
    fixture.package_dir(100, "demo", "hnp/tools/bin").unwrap();
    fixture.host_file("data/app/el2/100/base/demo/hnp/tools/bin/tool").unwrap();
    let engine = fixture.engine();

    let plan = engine.plan(&app("demo")).unwrap();
    assert_eq!(plan.operation_count(), 0);

    let construction = engine.construct_detailed(&app("demo")).unwrap();
    assert!(construction.applied.is_empty());
    assert_eq!(construction.history.last(), Some(&ConstructionState::Done));
    assert_eq!(fs::read_dir(construction.root.as_path()).unwrap().count(), 0);
}

/// Test: an unrecognized flag token aborts before anything touches the filesystem
#[test]
fn test_scenario_unknown_flag_no_mutation() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "private": {},
             "common": { "mount-paths": [
                { "source": "/system/etc", "target": "/system/etc" },
                { "source": "/system/lib", "target": "/system/lib", "flags": ["ro"] }
             ] } }"#,
    )
    .unwrap();
    let engine = fixture.engine();

    let err = engine.construct(&app("demo")).unwrap_err();
    match &err {
        SandboxError::UnknownMountFlag { token, .. } => assert_eq!(token, "ro"),
        other => panic!("unexpected error {other}"),
    }
    assert!(!err.left_partial_root());
    assert!(!fixture.config.install_root.exists());
    assert!(engine.syscalls().calls().is_empty());
}

/// Test: concurrent launches for different packages do not share resolved paths
#[test]
fn test_scenario_concurrent_launches_are_independent() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {},
             "private": { "mount-paths": [ { "source": "<PackageDataRoot>/files", "target": "/data/<PackageName>" } ] } }"#,
    )
    .unwrap();
    for package in ["alpha", "beta"] {
        fixture.package_dir(100, package, "files").unwrap();
    }
    let alpha_engine = fixture.engine();
    let beta_engine = fixture.engine();

    let (alpha, beta) = std::thread::scope(|scope| {
        let alpha = scope.spawn(|| alpha_engine.construct(&app("alpha")));
        let beta = scope.spawn(|| beta_engine.construct(&app("beta")));
        (alpha.join().unwrap(), beta.join().unwrap())
    });
    let (alpha, beta) = (alpha.unwrap(), beta.unwrap());
    assert_ne!(alpha, beta);

    for (engine, package, root) in [
        (&alpha_engine, "alpha", &alpha),
        (&beta_engine, "beta", &beta),
    ] {
        let calls = engine.syscalls().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].source.as_deref(),
            Some(
                fixture
                    .config
                    .package_data_root(100, package)
                    .join("files")
                    .as_path()
            )
        );
        assert_eq!(calls[0].target, root.as_path().join("data").join(package));
    }
}

// ============= Properties =============

/// Test: constructing twice succeeds and the second run changes nothing
#[test]
fn test_construct_is_idempotent() {
    let fixture = SandboxFixture::new().unwrap();
    fixture.host_dir("host/lib").unwrap();
    fixture
        .store
        .store_json(&format!(
            r#"{{ "sandbox-switch": true, "private": {{}},
                 "common": {{
                    "mount-paths": [ {{ "source": "{lib}", "target": "/system/lib", "flags": ["rec", "rdonly"] }} ],
                    "symlinks": [ {{ "source": "/system/bin", "target": "/bin" }} ]
                 }} }}"#,
            lib = fixture.host_path("host/lib"),
        ))
        .unwrap();
    let engine = fixture.engine();

    let first = engine.construct_detailed(&app("demo")).unwrap();
    assert!(first.applied.iter().all(|a| a.outcome == ApplyOutcome::Applied));
    engine.syscalls().clear_calls();

    let second = engine.construct_detailed(&app("demo")).unwrap();
    assert_eq!(first.root, second.root);
    assert_eq!(
        applied_destinations(&first.applied),
        applied_destinations(&second.applied)
    );
    assert!(
        second
            .applied
            .iter()
            .all(|a| a.outcome == ApplyOutcome::AlreadyPresent)
    );
    // No new binds; the read-only remount is reasserted on the existing mount.
    assert!(engine.syscalls().bind_targets().is_empty());
    assert_eq!(
        engine.syscalls().calls(),
        vec![MountCall {
            source: None,
            target: first.root.as_path().join("system/lib"),
            flags: MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        }]
    );
}

/// Test: the global switch off returns the system root and does nothing else
#[test]
fn test_global_switch_off() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": false,
             "common": { "mount-paths": [ { "source": "/system/lib", "target": "/system/lib", "flags": ["ro"] } ] },
             "private": { "symlinks": [ { "source": "/system/bin", "target": "/bin" } ] },
             "individual": { "demo": { "sandbox-switch": true } } }"#,
    )
    .unwrap();
    let engine = fixture.engine();

    let construction = engine.construct_detailed(&private_app("demo")).unwrap();
    assert_eq!(construction.mode, SandboxMode::Off);
    assert_eq!(construction.root.as_path(), fixture.config.system_root);
    assert_eq!(
        construction.history,
        vec![ConstructionState::Idle, ConstructionState::Done]
    );
    assert!(engine.syscalls().calls().is_empty());
    assert!(!fixture.config.install_root.exists());
}

/// Test: common operations all complete before any private one, in document order
#[test]
fn test_common_before_private_in_document_order() {
    let fixture = SandboxFixture::new().unwrap();
    for dir in ["host/c1", "host/c2", "host/p1", "host/i1"] {
        fixture.host_dir(dir).unwrap();
    }
    fixture
        .store
        .store_json(&format!(
            r#"{{ "sandbox-switch": true,
                 "common": {{
                    "mount-paths": [
                        {{ "source": "{c1}", "target": "/c1" }},
                        {{ "source": "{c2}", "target": "/c2" }}
                    ],
                    "symlinks": [ {{ "source": "/system/bin", "target": "/s1" }} ]
                 }},
                 "private": {{ "mount-paths": [ {{ "source": "{p1}", "target": "/p1" }} ] }},
                 "individual": {{ "demo": {{ "mount-paths": [ {{ "source": "{i1}", "target": "/i1" }} ] }} }} }}"#,
            c1 = fixture.host_path("host/c1"),
            c2 = fixture.host_path("host/c2"),
            p1 = fixture.host_path("host/p1"),
            i1 = fixture.host_path("host/i1"),
        ))
        .unwrap();
    let engine = fixture.engine();

    let construction = engine.construct_detailed(&app("demo")).unwrap();
    let root = construction.root.as_path();
    assert_eq!(
        applied_destinations(&construction.applied),
        vec![
            root.join("c1"),
            root.join("c2"),
            root.join("s1"),
            root.join("p1"),
            root.join("i1"),
        ]
    );
    assert_eq!(
        engine.syscalls().bind_targets(),
        vec![root.join("c1"), root.join("c2"), root.join("p1"), root.join("i1")]
    );
}

/// Test: a package switched off receives no private entries
#[test]
fn test_common_mode_skips_private_section() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {},
             "private": { "mount-paths": [ { "source": "data", "target": "data" } ] },
             "individual": { "demo": { "sandbox-switch": false } } }"#,
    )
    .unwrap();
    fixture.package_dir(100, "demo", "data").unwrap();
    let engine = fixture.engine();

    let construction = engine.construct_detailed(&app("demo")).unwrap();
    assert_eq!(construction.mode, SandboxMode::Common);
    assert!(construction.applied.is_empty());
    assert!(
        !construction
            .history
            .contains(&ConstructionState::PrivateApplied)
    );
}

// ============= Abort and cleanup =============

/// Test: a failed mount aborts with the reached state and leaves applied work in place
#[test]
fn test_mount_failure_aborts_without_rollback() {
    let fixture = SandboxFixture::new().unwrap();
    fixture.host_dir("host/a").unwrap();
    fixture.host_dir("host/b").unwrap();
    fixture
        .store
        .store_json(&format!(
            r#"{{ "sandbox-switch": true, "private": {{}},
                 "common": {{ "mount-paths": [
                    {{ "source": "{a}", "target": "/a" }},
                    {{ "source": "{b}", "target": "/b" }}
                 ] }} }}"#,
            a = fixture.host_path("host/a"),
            b = fixture.host_path("host/b"),
        ))
        .unwrap();
    let engine = fixture.engine();
    let root = fixture.config.install_root.join("100/sandbox/demo");
    engine.syscalls().fail_on(root.join("b"), Errno::EPERM);

    let err = engine.construct(&app("demo")).unwrap_err();
    match &err {
        SandboxError::Aborted {
            package,
            root: aborted_root,
            state,
            applied,
            ..
        } => {
            assert_eq!(package, "demo");
            assert_eq!(aborted_root, &root);
            assert_eq!(*state, ConstructionState::RootReady);
            assert_eq!(*applied, 1);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(err.root_cause(), SandboxError::Mount { .. }));
    assert!(err.left_partial_root());
    assert_eq!(engine.syscalls().mounted(), vec![root.join("a")]);
}

/// Test: a root that cannot be created is an explicit abort from `Idle`
#[test]
fn test_root_create_failure_aborts() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {}, "private": {} }"#,
    )
    .unwrap();
    fixture.host_file("mnt/sandbox/100/sandbox").unwrap();
    let engine = fixture.engine();

    let err = engine.construct(&app("demo")).unwrap_err();
    match &err {
        SandboxError::Aborted {
            package,
            state,
            applied,
            ..
        } => {
            assert_eq!(package, "demo");
            assert_eq!(*state, ConstructionState::Idle);
            assert_eq!(*applied, 0);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(err.root_cause(), SandboxError::RootCreate { .. }));
    assert!(err.left_partial_root());
    assert!(engine.syscalls().calls().is_empty());
}

/// Test: a package `sandbox-root` moves the whole construction
#[test]
fn test_package_sandbox_root_override() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {},
             "private": { "mount-paths": [ { "source": "data", "target": "data" } ] },
             "individual": { "demo": { "sandbox-root": "<SystemRoot>/../mnt/sandbox/<currentUserId>/shared/<PackageName>" } } }"#,
    )
    .unwrap();
    fixture.package_dir(100, "demo", "data").unwrap();
    let engine = fixture.engine();

    let root = engine.construct(&app("demo")).unwrap();
    let expected = fixture.config.install_root.join("100/shared/demo");
    assert_eq!(root.as_path(), expected);
    assert_eq!(engine.syscalls().bind_targets(), vec![expected.join("data")]);
    assert!(!fixture.config.install_root.join("100/sandbox").exists());
}

/// Test: a package `sandbox-root` outside the install root fails before any mutation
#[test]
fn test_package_sandbox_root_escape_rejected() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {}, "private": {},
             "individual": { "demo": { "sandbox-root": "<SystemRoot>/demo" } } }"#,
    )
    .unwrap();
    let engine = fixture.engine();

    let err = engine.construct(&app("demo")).unwrap_err();
    assert!(matches!(err, SandboxError::PathEscapesRoot { .. }));
    assert!(!err.left_partial_root());
    assert!(!fixture.config.install_root.exists());
}

/// Test: a conflicting file during the private stage aborts after common was applied
#[test]
fn test_symlink_conflict_aborts_in_private_stage() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {},
             "private": { "symlinks": [ { "source": "/system/bin", "target": "/bin" } ] } }"#,
    )
    .unwrap();
    fixture
        .host_file("mnt/sandbox/100/sandbox/demo/bin")
        .unwrap();
    let engine = fixture.engine();

    let err = engine.construct(&app("demo")).unwrap_err();
    match &err {
        SandboxError::Aborted { state, applied, .. } => {
            assert_eq!(*state, ConstructionState::CommonApplied);
            assert_eq!(*applied, 0);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(err.root_cause(), SandboxError::Symlink { .. }));
}

/// Test: discard refuses while mounts remain, then removes the root
#[test]
fn test_discard_after_abort() {
    let fixture = SandboxFixture::with_policy(
        r#"{ "sandbox-switch": true, "common": {},
             "private": { "mount-paths": [ { "source": "data", "target": "data" } ] } }"#,
    )
    .unwrap();
    fixture.package_dir(100, "demo", "data").unwrap();
    let engine = fixture.engine();
    let root = engine.construct(&app("demo")).unwrap();

    let err = engine.discard(root.as_path()).unwrap_err();
    assert!(matches!(err, SandboxError::Cleanup { .. }));
    assert!(root.as_path().exists());

    engine.syscalls().unmount_under(root.as_path());
    engine.discard(root.as_path()).unwrap();
    assert!(!root.as_path().exists());
    assert!(fixture.config.package_data_root(100, "demo").join("data").is_dir());
}

/// Test: discard never deletes outside the install root
#[test]
fn test_discard_outside_install_root_refused() {
    let fixture = SandboxFixture::new().unwrap();
    let outside = fixture.host_dir("elsewhere").unwrap();
    fixture.host_dir("mnt/sandbox").unwrap();

    let err = fixture.engine().discard(&outside).unwrap_err();
    assert!(matches!(err, SandboxError::Cleanup { .. }));
    assert!(outside.exists());
}

/// Test: constructing with no stored policy is a sequencing error
#[test]
fn test_not_loaded() {
    let fixture = SandboxFixture::new().unwrap();
    let err = fixture.engine().construct(&app("demo")).unwrap_err();
    assert!(matches!(err, SandboxError::NotLoaded));
}
