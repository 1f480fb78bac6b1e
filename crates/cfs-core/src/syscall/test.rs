use std::cell::RefCell;
use std::ffi::CStr;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;

use cfs_common::error::{CfsError, Result};

use super::Syscall;

/// Arguments of one recorded `mount(2)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountArgs {
    /// Mount source.
    pub source: Option<String>,
    /// Mount target.
    pub target: PathBuf,
    /// Filesystem type.
    pub fstype: Option<String>,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific data.
    pub data: Option<String>,
}

/// One call observed by [`RecordingSyscall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallCall {
    /// `sethostname(2)`.
    SetHostname(String),
    /// `chroot(2)`.
    Chroot(PathBuf),
    /// `chdir(2)`.
    Chdir(PathBuf),
    /// `mount(2)`.
    Mount(MountArgs),
    /// `unlinkat(2)` of a cgroup directory, by name.
    RemoveCgroup(String),
}

/// [`Syscall`] double that records calls instead of performing them.
///
/// Denied operations fail with `PermissionDenied`, mimicking a process
/// without `CAP_SYS_ADMIN`/`CAP_SYS_CHROOT`.
///
/// Cgroup removal is the one call with an effect: the group directory is
/// deleted together with its files, as cgroupfs does for its control
/// files, so that hierarchies faked on a regular filesystem can be torn
/// down.
#[derive(Debug, Default)]
pub struct RecordingSyscall {
    calls: RefCell<Vec<SyscallCall>>,
    denied: Vec<&'static str>,
}

impl RecordingSyscall {
    /// Creates a recorder that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder that denies every call.
    #[must_use]
    pub fn unprivileged() -> Self {
        Self::denying(&["sethostname", "chroot", "chdir", "mount", "unlinkat"])
    }

    /// Creates a recorder that denies only the named operations.
    #[must_use]
    pub fn denying(operations: &[&'static str]) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            denied: operations.to_vec(),
        }
    }

    /// Returns the calls recorded so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SyscallCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, operation: &str, call: SyscallCall) -> Result<()> {
        if self.denied.contains(&operation) {
            return Err(CfsError::PermissionDenied {
                message: format!("{operation}: EPERM: Operation not permitted"),
            });
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl Syscall for RecordingSyscall {
    fn set_hostname(&self, hostname: &str) -> Result<()> {
        self.record("sethostname", SyscallCall::SetHostname(hostname.to_string()))
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        self.record("chroot", SyscallCall::Chroot(path.to_path_buf()))
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        self.record("chdir", SyscallCall::Chdir(path.to_path_buf()))
    }

    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        self.record(
            "mount",
            SyscallCall::Mount(MountArgs {
                source: source.map(str::to_string),
                target: target.to_path_buf(),
                fstype: fstype.map(str::to_string),
                flags,
                data: data.map(str::to_string),
            }),
        )
    }

    fn remove_cgroup_at(&self, parent: BorrowedFd<'_>, name: &CStr) -> std::io::Result<()> {
        let name = name.to_string_lossy().into_owned();
        self.record("unlinkat", SyscallCall::RemoveCgroup(name.clone()))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::PermissionDenied, e.to_string()))?;
        let group = Path::new("/proc/self/fd")
            .join(parent.as_raw_fd().to_string())
            .join(name);
        std::fs::remove_dir_all(group)
    }
}
