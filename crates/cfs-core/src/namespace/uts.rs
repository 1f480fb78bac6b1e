//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname and domain name.

use cfs_common::config::validate_hostname;
use cfs_common::error::Result;

use crate::syscall::Syscall;

/// Sets the hostname inside the UTS namespace.
///
/// Only the calling process's UTS namespace is affected; the host keeps its
/// own hostname as long as the caller was cloned with `CLONE_NEWUTS`.
///
/// # Errors
///
/// Returns an error if the hostname is invalid or `sethostname(2)` fails.
pub fn set_hostname(syscall: &dyn Syscall, hostname: &str) -> Result<()> {
    validate_hostname(hostname)?;
    syscall.set_hostname(hostname)?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
