//! # AppSpawn Sandbox CLI
//!
//! Operator front end for the sandbox engine: inspect the plan for an app, build
//! its sandbox, or discard a root left behind by an aborted launch.

use crate::{
    AppProperty, EngineConfig, PolicyStore, SandboxEngine,
    config::DEFAULT_POLICY_PATH,
    utils::logging::{LogTarget, init_logging},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Build and inspect per-app filesystem sandboxes.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "appspawn_sandbox builds the bind-mount sandbox an app is launched in.

1. Plan: resolve the policy for one app and print every operation as JSON.
   Example: appspawn_sandbox plan --package com.example.demo --uid 100

2. Construct: create the sandbox root and apply the plan (requires CAP_SYS_ADMIN).
   Example: appspawn_sandbox construct --package com.example.demo --uid 100 --private

3. Discard: delete a sandbox root once nothing is mounted below it.
   Example: appspawn_sandbox discard /mnt/sandbox/100/sandbox/com.example.demo"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Sandbox policy document
    #[arg(long, global = true, env = "APPSPAWN_SANDBOX_POLICY", default_value = DEFAULT_POLICY_PATH)]
    pub policy: PathBuf,

    /// Parent directory of per-uid sandbox roots
    #[arg(long, global = true)]
    pub install_root: Option<PathBuf>,

    /// Parent directory of per-uid package data
    #[arg(long, global = true)]
    pub data_root: Option<PathBuf>,

    /// Root returned when sandboxing is switched off
    #[arg(long, global = true)]
    pub system_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of the rolling log file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the resolved operation plan without touching the filesystem
    Plan(AppArgs),
    /// Build the sandbox and print its root
    Construct(AppArgs),
    /// Remove a sandbox root
    Discard {
        /// Root directory to remove
        root: PathBuf,
    },
}

/// The app being launched.
#[derive(Args, Debug, Clone)]
pub struct AppArgs {
    /// Package name
    #[arg(long)]
    pub package: String,

    /// User id the app runs as
    #[arg(long)]
    pub uid: u32,

    /// Native ABI of the app
    #[arg(long, default_value = "arm64-v8a")]
    pub abi: String,

    /// Installed bundle path, for `<BundlePath>` templates
    #[arg(long)]
    pub bundle_path: Option<PathBuf>,

    /// Request the private entries even if the package switch is off
    #[arg(long)]
    pub private: bool,
}

impl AppArgs {
    pub fn app_property(&self) -> AppProperty {
        let app = AppProperty::new(&self.package, self.uid, &self.abi)
            .with_private_sandbox(self.private);
        match &self.bundle_path {
            Some(bundle) => app.with_bundle_path(bundle),
            None => app,
        }
    }
}

impl Cli {
    /// Environment config with command-line overrides applied.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(path) = &self.install_root {
            config.install_root = path.clone();
        }
        if let Some(path) = &self.data_root {
            config.data_root = path.clone();
        }
        if let Some(path) = &self.system_root {
            config.system_root = path.clone();
        }
        config
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    let target = if cli.log_to_stderr {
        LogTarget::Stderr
    } else {
        LogTarget::File
    };
    init_logging(log_level, target)?;

    execute(&cli)
}

/// Run one parsed command against the process-wide policy store.
pub fn execute(cli: &Cli) -> Result<()> {
    let store = PolicyStore::global();
    let engine = SandboxEngine::new(store.clone(), cli.engine_config());

    match &cli.command {
        Command::Plan(args) => {
            store
                .load_file(&cli.policy)
                .with_context(|| format!("Failed to load policy {}", cli.policy.display()))?;
            let plan = engine
                .plan(&args.app_property())
                .with_context(|| format!("Failed to plan sandbox for '{}'", args.package))?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Construct(args) => {
            store
                .load_file(&cli.policy)
                .with_context(|| format!("Failed to load policy {}", cli.policy.display()))?;
            let construction = engine
                .construct_detailed(&args.app_property())
                .with_context(|| format!("Failed to construct sandbox for '{}'", args.package))?;
            println!("{}", construction.root);
        }
        Command::Discard { root } => {
            engine
                .discard(root)
                .with_context(|| format!("Failed to discard {}", root.display()))?;
        }
    }
    Ok(())
}
