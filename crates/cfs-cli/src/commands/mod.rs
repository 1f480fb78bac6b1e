//! CLI command definitions and dispatch.

pub mod child;
pub mod run;
pub mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use cfs_common::config::RuntimeConfig;
use cfs_common::constants::{
    BOOTSTRAP_ALIAS, BOOTSTRAP_SUBCOMMAND, CGROUP_PARENT, CGROUP_V2_PATH,
};

/// cfs: run a command in an isolated, resource-limited container.
#[derive(Parser, Debug)]
#[command(name = "cfs", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Where containers get their cgroups.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Mount point of the cgroup v2 hierarchy.
    #[arg(long, global = true, default_value = CGROUP_V2_PATH)]
    pub cgroup_root: PathBuf,

    /// Parent cgroup holding one group per container.
    #[arg(long, global = true, default_value = CGROUP_PARENT)]
    pub cgroup_parent: String,
}

impl GlobalArgs {
    /// Runtime configuration with these overrides applied.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            cgroup_root: self.cgroup_root.clone(),
            cgroup_parent: self.cgroup_parent.clone(),
            ..RuntimeConfig::default()
        }
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command inside an image directory and wait for it.
    #[command(visible_alias = "r")]
    Run(run::RunArgs),
    /// Serve the HTTP/JSON façade.
    #[command(visible_alias = "s")]
    Serve(serve::ServeArgs),
    /// Container bootstrap, started by the launcher inside new namespaces.
    #[command(name = BOOTSTRAP_SUBCOMMAND, alias = BOOTSTRAP_ALIAS, hide = true)]
    Child(child::ChildArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command fails before producing an exit status.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = cli.global.runtime_config();
    match cli.command {
        Command::Run(args) => run::execute(args, config),
        Command::Serve(args) => serve::execute(args, config),
        Command::Child(args) => Ok(child::execute(args, &cli.global)),
    }
}

/// Converts a numeric status into a process exit code.
#[must_use]
pub fn exit_status(code: i32) -> ExitCode {
    ExitCode::from(shell_code(code))
}

/// Truncates a status to the 0-255 range, modulo 256 like a shell.
fn shell_code(code: i32) -> u8 {
    u8::try_from(code.rem_euclid(256)).unwrap_or(u8::MAX)
}
