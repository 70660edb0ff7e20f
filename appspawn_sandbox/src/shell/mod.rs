//! # Shell Module
//!
//! Entry point and argument handling for the `appspawn_sandbox` binary.

pub mod cli;

pub use cli::{Cli, Command, execute, run};
