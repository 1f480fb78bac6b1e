//! Mount namespace isolation.
//!
//! A fresh mount namespace starts as a copy of the host's mount table,
//! including its shared propagation. Mounts made by the container must not
//! leak back, so the whole tree is switched to private first.

use std::path::Path;

use nix::mount::MsFlags;

use cfs_common::error::Result;

use crate::syscall::Syscall;

/// Marks every mount in the current namespace as recursively private.
///
/// # Errors
///
/// Returns an error if the `mount(2)` propagation change fails.
pub fn make_mounts_private(syscall: &dyn Syscall) -> Result<()> {
    syscall.mount(
        None,
        Path::new("/"),
        None,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None,
    )?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}
