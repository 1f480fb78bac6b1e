//! Runtime configuration model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{CfsError, Result};
use crate::types::ResourceLimits;

/// Settings shared by every container the runtime launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Mount point of the cgroup v2 hierarchy.
    pub cgroup_root: PathBuf,
    /// Name of the parent cgroup holding one leaf per container.
    pub cgroup_parent: String,
    /// Hostname set inside each container's UTS namespace.
    pub hostname: String,
    /// Limits applied to specs that do not set their own.
    pub default_limits: ResourceLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cgroup_root: PathBuf::from(constants::CGROUP_V2_PATH),
            cgroup_parent: constants::CGROUP_PARENT.to_string(),
            hostname: constants::DEFAULT_HOSTNAME.to_string(),
            default_limits: ResourceLimits {
                max_pids: Some(constants::DEFAULT_MAX_PIDS),
                max_memory_bytes: Some(constants::DEFAULT_MAX_MEMORY_BYTES),
                cpu_max: None,
            },
        }
    }
}

impl RuntimeConfig {
    /// Checks the hostname and cgroup parent before they reach the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::InvalidSpec`] for an empty or oversized hostname,
    /// or [`CfsError::Config`] for a cgroup parent that is not a single path
    /// component.
    pub fn validate(&self) -> Result<()> {
        validate_hostname(&self.hostname)?;
        if self.cgroup_parent.is_empty()
            || self.cgroup_parent.contains('/')
            || self.cgroup_parent == "."
            || self.cgroup_parent == ".."
        {
            return Err(CfsError::Config {
                message: format!("invalid cgroup parent name: {:?}", self.cgroup_parent),
            });
        }
        Ok(())
    }
}

/// Accepts RFC 1123 style hostnames no longer than `HOST_NAME_MAX`.
///
/// # Errors
///
/// Returns [`CfsError::InvalidSpec`] describing the offending hostname.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() || hostname.len() > constants::HOST_NAME_MAX {
        return Err(CfsError::invalid_spec(format!(
            "hostname must be 1-{} bytes, got {}",
            constants::HOST_NAME_MAX,
            hostname.len()
        )));
    }
    let valid_label = |label: &str| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if !hostname.split('.').all(valid_label) {
        return Err(CfsError::invalid_spec(format!("invalid hostname: {hostname:?}")));
    }
    Ok(())
}
