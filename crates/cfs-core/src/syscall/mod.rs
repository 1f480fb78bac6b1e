//! Kernel calls used by the container bootstrap, behind a trait.
//!
//! Production code goes through [`LinuxSyscall`]; tests substitute
//! [`RecordingSyscall`] to observe the exact sequence of privileged calls
//! without needing root.

mod linux;
mod test;

use std::ffi::CStr;
use std::os::fd::BorrowedFd;
use std::path::Path;

use nix::mount::MsFlags;

use cfs_common::error::Result;

pub use linux::{LinuxSyscall, errno_to_error};
pub use test::{MountArgs, RecordingSyscall, SyscallCall};

/// Privileged operations the bootstrap needs from the kernel.
pub trait Syscall {
    /// Sets the hostname of the current UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if `sethostname(2)` fails.
    fn set_hostname(&self, hostname: &str) -> Result<()>;

    /// Changes the root directory of the calling process.
    ///
    /// # Errors
    ///
    /// Returns an error if `chroot(2)` fails.
    fn chroot(&self, path: &Path) -> Result<()>;

    /// Changes the working directory of the calling process.
    ///
    /// # Errors
    ///
    /// Returns an error if `chdir(2)` fails.
    fn chdir(&self, path: &Path) -> Result<()>;

    /// Mounts a filesystem or changes mount propagation.
    ///
    /// # Errors
    ///
    /// Returns an error if `mount(2)` fails.
    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;

    /// Removes the cgroup directory `name` from the group open as `parent`.
    ///
    /// # Errors
    ///
    /// Returns the raw OS error of `unlinkat(2)`, so that callers can tell
    /// a busy group (`EBUSY`) from one that is already gone (`ENOENT`).
    fn remove_cgroup_at(&self, parent: BorrowedFd<'_>, name: &CStr) -> std::io::Result<()>;
}
