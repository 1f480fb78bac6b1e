use std::ffi::CStr;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::Path;

use nix::errno::Errno;
use nix::mount::{MsFlags, mount};
use nix::unistd::{chdir, chroot, sethostname};

use cfs_common::error::{CfsError, Result};

use super::Syscall;

/// [`Syscall`] implementation that talks to the running kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxSyscall;

/// Maps an errno from a privileged call onto the workspace taxonomy.
///
/// `EPERM` and `EACCES` mean the caller lacks privilege; everything else is
/// reported as a failed syscall.
pub fn errno_to_error(operation: &'static str, errno: Errno) -> CfsError {
    match errno {
        Errno::EPERM | Errno::EACCES => CfsError::PermissionDenied {
            message: format!("{operation}: {errno}"),
        },
        _ => CfsError::Syscall {
            operation,
            message: errno.to_string(),
        },
    }
}

impl Syscall for LinuxSyscall {
    fn set_hostname(&self, hostname: &str) -> Result<()> {
        sethostname(hostname).map_err(|e| errno_to_error("sethostname", e))
    }

    fn chroot(&self, path: &Path) -> Result<()> {
        chroot(path).map_err(|e| errno_to_error("chroot", e))
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        chdir(path).map_err(|e| errno_to_error("chdir", e))
    }

    fn mount(
        &self,
        source: Option<&str>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        mount(source, target, fstype, flags, data).map_err(|e| errno_to_error("mount", e))
    }

    fn remove_cgroup_at(&self, parent: BorrowedFd<'_>, name: &CStr) -> std::io::Result<()> {
        // SAFETY: `parent` is a live descriptor for the duration of the
        // borrow and `name` is NUL-terminated.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::unlinkat(parent.as_raw_fd(), name.as_ptr(), libc::AT_REMOVEDIR) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eperm_maps_to_permission_denied() {
        let err = errno_to_error("chroot", Errno::EPERM);
        assert!(matches!(err, CfsError::PermissionDenied { .. }));
        assert!(err.to_string().contains("chroot"));
    }

    #[test]
    fn other_errno_maps_to_syscall_error() {
        let err = errno_to_error("mount", Errno::ENOENT);
        assert!(matches!(
            err,
            CfsError::Syscall {
                operation: "mount",
                ..
            }
        ));
    }
}
