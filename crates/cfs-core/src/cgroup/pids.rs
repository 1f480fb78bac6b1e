//! Process-count control via cgroups v2.

use std::path::Path;

use cfs_common::error::{CfsError, Result};

/// Caps the number of tasks in the group.
///
/// Once reached, `fork(2)`/`clone(2)` inside the group fail with `EAGAIN`.
///
/// # Errors
///
/// Returns an error if writing to `pids.max` fails.
pub fn set_pids_max(cgroup_path: &Path, max: u64) -> Result<()> {
    let file = cgroup_path.join("pids.max");
    std::fs::write(&file, max.to_string()).map_err(|e| CfsError::io(file, e))?;
    tracing::debug!(max, "pids max set");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_pids_max() {
        let dir = tempfile::tempdir().expect("tempdir");
        set_pids_max(dir.path(), 16).expect("write");
        let content = std::fs::read_to_string(dir.path().join("pids.max")).expect("read");
        assert_eq!(content, "16");
    }
}
