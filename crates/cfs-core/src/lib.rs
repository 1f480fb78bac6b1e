//! # cfs-core
//!
//! Low-level Linux isolation primitives for the CFS runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: PID, mount and UTS isolation flags, hostname and mount
//!   propagation setup.
//! - **Cgroups v2**: process-count, memory and CPU ceilings.
//! - **Filesystem**: the root jail and the `/proc` mount inside it.
//!
//! Every privileged kernel call goes through the [`syscall::Syscall`] trait
//! so the setup sequence can be verified without root.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

#[cfg(not(target_os = "linux"))]
compile_error!("cfs-core requires Linux namespaces and cgroups v2");

pub mod cgroup;
pub mod filesystem;
pub mod namespace;
pub mod syscall;
