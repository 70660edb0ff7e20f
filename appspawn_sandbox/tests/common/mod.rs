//! Shared helpers for appspawn_sandbox integration tests.

#![allow(dead_code)]

use appspawn_sandbox::AppProperty;
use appspawn_sandbox::orchestrator::AppliedOperation;
use appspawn_sandbox::planner::ResolvedOperation;
use std::path::PathBuf;

pub const UID: u32 = 100;

/// Policy with the global switch on and nothing in either section.
pub const EMPTY_ON: &str = r#"{ "sandbox-switch": true, "common": {}, "private": {} }"#;

pub fn app(package: &str) -> AppProperty {
    AppProperty::new(package, UID, "arm64-v8a")
}

pub fn private_app(package: &str) -> AppProperty {
    app(package).with_private_sandbox(true)
}

/// Destinations of `ops`, in order.
pub fn destinations(ops: &[ResolvedOperation]) -> Vec<PathBuf> {
    ops.iter().map(|op| op.destination().to_path_buf()).collect()
}

pub fn applied_destinations(applied: &[AppliedOperation]) -> Vec<PathBuf> {
    applied
        .iter()
        .map(|a| a.operation.destination().to_path_buf())
        .collect()
}
