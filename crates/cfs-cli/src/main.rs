//! # cfs: container from scratch
//!
//! Runs a command inside fresh PID, UTS and mount namespaces, jailed in an
//! image directory and bounded by cgroup v2 limits.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cfs_common::constants::{
    BIN_NAME, BOOTSTRAP_ALIAS, BOOTSTRAP_SUBCOMMAND, EXIT_BOOTSTRAP_FAILED,
};

use crate::commands::Cli;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // A bootstrap that cannot read its handoff is a runtime failure,
        // not a usage error.
        Err(e) if e.use_stderr() && invoked_as_bootstrap() => {
            tracing::error!(error = %e, "bootstrap started with a bad argument vector");
            return commands::exit_status(EXIT_BOOTSTRAP_FAILED);
        }
        Err(e) => e.exit(),
    };
    match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{BIN_NAME}: {e:#}");
            commands::exit_status(EXIT_BOOTSTRAP_FAILED)
        }
    }
}

fn invoked_as_bootstrap() -> bool {
    std::env::args_os()
        .nth(1)
        .is_some_and(|cmd| cmd == BOOTSTRAP_SUBCOMMAND || cmd == BOOTSTRAP_ALIAS)
}
