//! # cfs-runtime
//!
//! The two-stage container launch pipeline.
//!
//! - [`launcher`] runs on the host: it validates a container spec, clones a child
//!   into new namespaces and waits for it.
//! - [`bootstrap`] runs in that child after re-exec: hostname, cgroup
//!   limits, root jail, then exec of the container command.
//! - [`handoff`] and [`status`] are the two channels between them: the
//!   argument vector going in, and the start marker or failure report
//!   coming back.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod bootstrap;
pub mod handoff;
pub mod launcher;
pub mod status;

pub use launcher::{Launcher, run};
