//! `cfs run`: run a command in a container and wait for it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;

use cfs_common::config::RuntimeConfig;
use cfs_common::constants::BIN_NAME;
use cfs_common::error::CfsError;
use cfs_common::types::{ContainerSpec, CpuMax, ResourceLimits, parse_bytes};
use cfs_runtime::Launcher;

use super::exit_status;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Memory ceiling, e.g. `256MiB`, `1GB` or a byte count.
    #[arg(long, value_parser = parse_memory)]
    pub memory: Option<u64>,

    /// Maximum number of processes in the container.
    #[arg(long)]
    pub pids: Option<u64>,

    /// CPU bandwidth as `QUOTA:PERIOD` in microseconds, e.g. `50000:100000`.
    #[arg(long)]
    pub cpu_max: Option<CpuMax>,

    /// Hostname inside the container.
    #[arg(long)]
    pub hostname: Option<String>,

    /// Directory used as the container's root filesystem.
    pub image: PathBuf,

    /// Command to run as PID 1 inside the container.
    pub command: String,

    /// Arguments passed to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    /// Limits for this run: the defaults with every given flag applied.
    fn limits(&self, defaults: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            max_pids: self.pids.or(defaults.max_pids),
            max_memory_bytes: self.memory.or(defaults.max_memory_bytes),
            cpu_max: self.cpu_max.or(defaults.cpu_max),
        }
    }
}

fn parse_memory(value: &str) -> Result<u64, String> {
    parse_bytes(value).ok_or_else(|| format!("invalid memory size: {value:?}"))
}

/// Executes the `run` command.
///
/// The process exits with the container's exit code, `128 + signal` when
/// the container was killed, or 126/127 when the command could not be
/// executed.
///
/// # Errors
///
/// Returns an error if the container spec is invalid or the container could not be
/// started.
pub fn execute(args: RunArgs, mut config: RuntimeConfig) -> anyhow::Result<ExitCode> {
    if let Some(hostname) = &args.hostname {
        config.hostname.clone_from(hostname);
    }
    let spec = ContainerSpec::builder(&args.image, &args.command)
        .args(args.args.iter().cloned())
        .limits(args.limits(&config.default_limits))
        .build()?;
    let launcher = Launcher::new(config)?;
    tracing::debug!(image = %spec.image_path().display(), command = %spec.command(), "launching container");

    match launcher.run(&spec) {
        Ok(code) => Ok(exit_status(code)),
        Err(e @ (CfsError::TerminatedBySignal { .. } | CfsError::ExecFailed { .. })) => {
            eprintln!("{BIN_NAME}: {e}");
            Ok(exit_status(e.exit_code()))
        }
        Err(e) => Err(e.into()),
    }
}
