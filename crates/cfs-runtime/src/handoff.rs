//! Argument vector passed from the launcher to the bootstrap.
//!
//! The launcher and the bootstrap run in different processes and share no
//! memory, so everything the bootstrap needs travels in its `argv`:
//!
//! ```text
//! <exe> child v1 --cgroup-root <path> --cgroup-parent <name> --cgroup <name>
//!       --hostname <name> --status-fd <fd>
//!       [--pids <n>] [--memory <bytes>] [--cpu-max <quota>:<period>]
//!       -- <image> <command> [args...]
//! ```
//!
//! `child` is [`BOOTSTRAP_SUBCOMMAND`] and `v1` is [`HANDOFF_VERSION`].
//! The binary's command line parser reads it back; everything after `--` is
//! positional and passed through untouched. Paths travel as raw OS strings.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::PathBuf;

use cfs_common::constants::{BOOTSTRAP_SUBCOMMAND, HANDOFF_VERSION};
use cfs_common::types::ResourceLimits;

/// Everything the bootstrap needs to set up and exec one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    /// Mount point of the cgroup v2 hierarchy.
    pub cgroup_root: PathBuf,
    /// Parent group holding the container's leaf.
    pub cgroup_parent: String,
    /// Unique leaf group name chosen by the launcher.
    pub cgroup_name: String,
    /// Hostname for the UTS namespace.
    pub hostname: String,
    /// Write end of the launcher's status pipe.
    pub status_fd: RawFd,
    /// Ceilings for the leaf group.
    pub limits: ResourceLimits,
    /// Host path of the image root.
    pub image_path: PathBuf,
    /// Command to exec inside the jail.
    pub command: String,
    /// Arguments for the command.
    pub args: Vec<String>,
}

impl Handoff {
    /// Renders the argument vector, starting with the bootstrap subcommand.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = vec![
            BOOTSTRAP_SUBCOMMAND.into(),
            HANDOFF_VERSION.into(),
            "--cgroup-root".into(),
            self.cgroup_root.clone().into_os_string(),
            "--cgroup-parent".into(),
            self.cgroup_parent.clone().into(),
            "--cgroup".into(),
            self.cgroup_name.clone().into(),
            "--hostname".into(),
            self.hostname.clone().into(),
            "--status-fd".into(),
            self.status_fd.to_string().into(),
        ];
        if let Some(pids) = self.limits.max_pids {
            argv.extend(["--pids".into(), pids.to_string().into()]);
        }
        if let Some(bytes) = self.limits.max_memory_bytes {
            argv.extend(["--memory".into(), bytes.to_string().into()]);
        }
        if let Some(cpu) = self.limits.cpu_max {
            argv.extend(["--cpu-max".into(), cpu.to_string().into()]);
        }
        argv.push("--".into());
        argv.push(self.image_path.clone().into_os_string());
        argv.push(self.command.clone().into());
        argv.extend(self.args.iter().map(OsString::from));
        argv
    }
}
