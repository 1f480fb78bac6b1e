//! Filesystem isolation: the root jail and the mounts it needs.

pub mod jail;
pub mod mount;
