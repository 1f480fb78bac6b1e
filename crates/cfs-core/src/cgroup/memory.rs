//! Memory resource control via cgroups v2.
//!
//! Manages `memory.max` and `memory.swap.max`.

use std::path::Path;

use cfs_common::error::{CfsError, Result};

/// Sets the hard memory limit for a cgroup.
///
/// When the group cannot reclaim below the limit the kernel OOM killer
/// terminates one of its processes with `SIGKILL`.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    let file = cgroup_path.join("memory.max");
    std::fs::write(&file, bytes.to_string()).map_err(|e| CfsError::io(file, e))?;
    tracing::debug!(bytes, "memory max set");
    Ok(())
}

/// Forbids the group from swapping, so `memory.max` is a real ceiling.
///
/// Kernels built without swap accounting have no `memory.swap.max`; that
/// is not an error since there is nothing to swap to.
///
/// # Errors
///
/// Returns an error if `memory.swap.max` exists but cannot be written.
pub fn disable_swap(cgroup_path: &Path) -> Result<()> {
    let file = cgroup_path.join("memory.swap.max");
    if !file.exists() {
        tracing::debug!("no swap accounting, skipping memory.swap.max");
        return Ok(());
    }
    std::fs::write(&file, "0").map_err(|e| CfsError::io(file, e))?;
    tracing::debug!("swap disabled");
    Ok(())
}
