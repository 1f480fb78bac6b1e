//! `cfs serve`: the HTTP/JSON façade.

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Args;

use cfs_common::config::RuntimeConfig;
use cfs_common::constants::DEFAULT_SERVER_ADDR;
use cfs_runtime::Launcher;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_SERVER_ADDR)]
    pub addr: SocketAddr,
}

/// Executes the `serve` command. Runs until interrupted.
///
/// # Errors
///
/// Returns an error if the runtime cannot be set up or the address cannot
/// be bound.
pub fn execute(args: ServeArgs, config: RuntimeConfig) -> anyhow::Result<ExitCode> {
    let launcher = Launcher::new(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(cfs_server::serve(args.addr, launcher))?;
    Ok(ExitCode::SUCCESS)
}
