//! # Logging Initialization
//!
//! One-time setup of the `tracing` subscriber for the `appspawn_sandbox` binaries.
//!
//! - **Filter**: `RUST_LOG` when set, otherwise `<level>,appspawn_sandbox=<level>`.
//! - **File** ([`LogTarget::File`]): daily rolling `appspawn_sandbox.log` in the
//!   user cache directory from `directories`, without ANSI colors.
//! - **Stderr** ([`LogTarget::Stderr`]): colored output for interactive use.
//! - **Fallback**: if the cache directory cannot be found or written, logs go to
//!   stderr instead of failing the launch.
//!
//! Repeated calls are no-ops; the first call wins.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

const LOG_FILE_NAME: &str = "appspawn_sandbox.log";

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if `log_level` is not a valid filter directive.
pub fn init_logging(log_level: &str, target: LogTarget) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{log_level},appspawn_sandbox={log_level}"))
            .with_context(|| format!("Invalid log level '{log_level}'"))?,
    };

    INIT.call_once(|| {
        if target == LogTarget::File
            && let Some(dirs) = ProjectDirs::from("org", "AppSpawn", "appspawn_sandbox")
            && let Some(appender) = daily_appender(dirs.cache_dir())
        {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(layer().with_writer(non_blocking).with_ansi(false))
                .init();
            // Leaked so buffered lines are flushed at process exit.
            Box::leak(Box::new(guard));
            return;
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });

    Ok(())
}

/// `tracing_appender::rolling::daily` panics on unwritable directories, so check
/// first and contain any panic.
fn daily_appender(dir: &Path) -> Option<tracing_appender::rolling::RollingFileAppender> {
    if !can_write(dir) {
        return None;
    }
    std::panic::catch_unwind(|| tracing_appender::rolling::daily(dir, LOG_FILE_NAME)).ok()
}

fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(".appspawn_log_write_check");
    let writable = std::fs::write(&marker, b"").is_ok();
    let _ = std::fs::remove_file(&marker);
    writable
}
