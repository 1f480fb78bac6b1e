//! Namespace entry: the second stage of a container launch.
//!
//! The launcher re-executes the runtime binary inside fresh PID, UTS and
//! mount namespaces. That process lands here and, in this order:
//!
//! 1. sets the container hostname,
//! 2. makes every mount private so nothing propagates back to the host,
//! 3. creates the container's cgroup, writes its limits and joins it,
//! 4. applies the root jail and mounts `/proc`,
//! 5. replaces itself with the target command, which becomes PID 1.
//!
//! Nothing here returns on success. Any failure is reported back through
//! the status pipe and turned into the process exit code.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::unistd::execve;

use cfs_common::constants::DEFAULT_CONTAINER_PATH;
use cfs_common::error::CfsError;
use cfs_core::cgroup::{CgroupManager, PinnedRelease};
use cfs_core::filesystem::jail::{JailLatch, RootJail};
use cfs_core::namespace::{mount, uts};
use cfs_core::syscall::{LinuxSyscall, Syscall};

use crate::handoff::Handoff;
use crate::status::{FailureReport, StatusSender};

fn exec_failure(command: &str, errno: Errno) -> CfsError {
    CfsError::ExecFailed {
        command: command.to_string(),
        message: errno.to_string(),
        not_found: matches!(errno, Errno::ENOENT | Errno::ENOTDIR),
    }
}

/// Entry point of the bootstrap subcommand.
///
/// Returns the exit status only on failure; on success the process image
/// is replaced by the container command.
pub fn main(handoff: Handoff) -> i32 {
    let status = match StatusSender::adopt(handoff.status_fd) {
        Ok(mut sender) => {
            if let Err(e) = sender.acknowledge() {
                tracing::warn!(error = %e, "could not signal bootstrap start");
            }
            Some(sender)
        }
        Err(e) => {
            tracing::warn!(error = %e, "status pipe unavailable, failures reported by exit code only");
            None
        }
    };

    let failure = Bootstrap::new(handoff, &LinuxSyscall).run();
    let code = failure.exit_code();
    tracing::error!(error = %failure, code, "container bootstrap failed");
    if let Some(status) = status {
        if let Err(e) = status.send(&FailureReport::from_error(&failure)) {
            tracing::warn!(error = %e, "could not report failure to launcher");
        }
    }
    code
}

/// Sets up one container from inside its namespaces.
pub struct Bootstrap<'a> {
    handoff: Handoff,
    syscall: &'a dyn Syscall,
    latch: &'a JailLatch,
}

impl<'a> Bootstrap<'a> {
    /// Prepares a bootstrap for `handoff`, jailing the current process.
    #[must_use]
    pub fn new(handoff: Handoff, syscall: &'a dyn Syscall) -> Self {
        Self {
            handoff,
            syscall,
            latch: JailLatch::process(),
        }
    }

    /// Tracks the jail with `latch` instead of the process-wide one.
    #[must_use]
    pub fn with_latch(mut self, latch: &'a JailLatch) -> Self {
        self.latch = latch;
        self
    }

    /// Runs every step up to and including exec.
    ///
    /// Returns only if something failed. A cgroup created along the way is
    /// released before returning.
    pub fn run(&self) -> CfsError {
        let group = match self.enter() {
            Ok(group) => group,
            Err(failure) => return failure,
        };
        let failure = exec_command(&self.handoff.command, &self.handoff.args);
        self.release(group);
        failure
    }

    /// Configures hostname, mounts, limits and jail, in that order.
    ///
    /// On success the calling process is jailed and inside the container's
    /// cgroup; the returned release removes that cgroup if exec fails.
    ///
    /// # Errors
    ///
    /// Returns the first failing step. The cgroup is already released when
    /// the jail is what failed.
    pub fn enter(&self) -> Result<PinnedRelease, CfsError> {
        let h = &self.handoff;
        uts::set_hostname(self.syscall, &h.hostname)?;
        mount::make_mounts_private(self.syscall)?;

        let jail = RootJail::with_latch(&h.image_path, self.syscall, self.latch)?;
        let cgroups = CgroupManager::new(&h.cgroup_root, &h.cgroup_parent);
        let handle = cgroups.apply_limits(&h.cgroup_name, &h.limits)?;
        let group = cgroups.pin_release(handle)?;

        if let Err(e) = jail.apply() {
            self.release(group);
            return Err(e);
        }
        tracing::debug!(command = %h.command, "container environment ready");
        Ok(group)
    }

    fn release(&self, group: PinnedRelease) {
        let name = group.handle().name().to_string();
        if let Err(e) = group.release(self.syscall) {
            tracing::warn!(cgroup = %name, error = %e, "could not release cgroup, launcher will retry");
        }
    }
}

/// Paths tried, in order, when executing `command` inside the jail.
///
/// Commands containing a slash are used as given; bare names are looked up
/// in the default container `PATH`.
#[must_use]
pub fn exec_candidates(command: &str) -> Vec<PathBuf> {
    if command.contains('/') {
        return vec![PathBuf::from(command)];
    }
    DEFAULT_CONTAINER_PATH
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(command))
        .collect()
}

/// Environment of the container command: inherited, with `PATH` reset to
/// the container default.
fn container_env() -> Vec<CString> {
    let mut env: Vec<CString> = std::env::vars_os()
        .filter(|(key, _)| key != "PATH")
        .filter_map(|(key, value)| {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            CString::new(entry).ok()
        })
        .collect();
    if let Ok(path) = CString::new(format!("PATH={DEFAULT_CONTAINER_PATH}")) {
        env.push(path);
    }
    env
}

/// Replaces the process with `command`. Returns only on failure.
fn exec_command(command: &str, args: &[String]) -> CfsError {
    let argv: Vec<CString> = match std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(argv) => argv,
        Err(_) => return CfsError::invalid_spec("command line contains a NUL byte"),
    };
    let env = container_env();

    // Same rules as execvp: a missing candidate moves on to the next one,
    // and EACCES wins over ENOENT if nothing else succeeds.
    let mut result = Errno::ENOENT;
    for candidate in exec_candidates(command) {
        let Ok(path) = CString::new(candidate.as_os_str().as_bytes()) else {
            continue;
        };
        match execve(&path, &argv, &env) {
            Err(Errno::ENOENT | Errno::ENOTDIR) => {}
            Err(Errno::EACCES) => result = Errno::EACCES,
            Err(errno) => {
                result = errno;
                break;
            }
            Ok(never) => match never {},
        }
    }
    exec_failure(command, result)
}
