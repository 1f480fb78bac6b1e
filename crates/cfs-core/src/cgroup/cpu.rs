//! CPU resource control via cgroups v2.
//!
//! Manages `cpu.max`.

use std::path::Path;

use cfs_common::error::{CfsError, Result};

/// Sets the CPU bandwidth limit (max microseconds per period).
///
/// Writes `quota_us period_us` to `cpu.max`, where `quota_us` is the
/// maximum CPU time allowed per `period_us` window. Exceeding it throttles
/// the group until the next period.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, quota_us: u64, period_us: u64) -> Result<()> {
    let file = cgroup_path.join("cpu.max");
    let value = format!("{quota_us} {period_us}");
    std::fs::write(&file, value).map_err(|e| CfsError::io(file, e))?;
    tracing::debug!(quota_us, period_us, "CPU max quota set");
    Ok(())
}
