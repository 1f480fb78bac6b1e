//! Mount utilities for container filesystem setup.

use std::path::Path;

use nix::mount::MsFlags;

use cfs_common::error::Result;

use crate::syscall::Syscall;

/// Mounts a fresh `proc` filesystem at `target`.
///
/// Mounted from inside a new PID namespace, the instance only lists the
/// processes of that namespace.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn mount_proc(syscall: &dyn Syscall, target: &Path) -> Result<()> {
    syscall.mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
        None,
    )?;
    tracing::debug!(target = %target.display(), "proc mounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::{MountArgs, RecordingSyscall, SyscallCall};

    #[test]
    fn proc_is_mounted_hardened() {
        let syscall = RecordingSyscall::new();
        mount_proc(&syscall, Path::new("/proc")).expect("mount");
        assert_eq!(
            syscall.calls(),
            vec![SyscallCall::Mount(MountArgs {
                source: Some("proc".into()),
                target: "/proc".into(),
                fstype: Some("proc".into()),
                flags: MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC,
                data: None,
            })]
        );
    }
}
