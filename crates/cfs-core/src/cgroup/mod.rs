//! Cgroups v2 resource management.
//!
//! Every container gets a leaf group `<root>/<parent>/<name>` in the unified
//! hierarchy. The bootstrap creates the leaf, writes the ceilings and moves
//! itself in before exec, so the command and all of its descendants are
//! bounded from their first instruction.

pub mod cpu;
pub mod memory;
pub mod pids;

use std::ffi::CString;
use std::io::{ErrorKind, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cfs_common::config::RuntimeConfig;
use cfs_common::error::{CfsError, Result};
use cfs_common::types::ResourceLimits;

use crate::syscall::Syscall;

/// How often `release` retries while the kernel still reports the group busy.
const RELEASE_ATTEMPTS: u32 = 10;

/// A container's leaf cgroup. Released exactly once, by value.
#[derive(Debug, PartialEq, Eq)]
pub struct CgroupHandle {
    name: String,
    path: PathBuf,
}

impl CgroupHandle {
    /// Unique name of the group.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory of the group inside the hierarchy.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Creates, fills and removes container cgroups under one parent group.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    root: PathBuf,
    parent: String,
}

impl CgroupManager {
    /// Manages groups under `<root>/<parent>`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, parent: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            parent: parent.into(),
        }
    }

    /// Manages groups where the runtime configuration says to.
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(&config.cgroup_root, &config.cgroup_parent)
    }

    /// Directory of the parent group.
    #[must_use]
    pub fn parent_path(&self) -> PathBuf {
        self.root.join(&self.parent)
    }

    /// Directory a group called `name` lives in.
    #[must_use]
    pub fn group_path(&self, name: &str) -> PathBuf {
        self.parent_path().join(name)
    }

    /// Creates group `name`, writes `limits` into it and moves the calling
    /// process in.
    ///
    /// Nothing is left behind on failure: if the leaf was already created it
    /// is removed again before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`CfsError::ResourceControlUnavailable`] if the hierarchy or a
    ///   controller needed by `limits` is missing.
    /// - [`CfsError::PermissionDenied`] if the caller may not create groups.
    /// - [`CfsError::Config`] if `name` is invalid or already taken.
    /// - [`CfsError::Io`] if a control file cannot be written.
    pub fn apply_limits(&self, name: &str, limits: &ResourceLimits) -> Result<CgroupHandle> {
        validate_group_name(name)?;
        let controllers = required_controllers(limits);
        self.prepare_parent(&controllers)?;

        let path = self.group_path(name);
        std::fs::create_dir(&path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => CfsError::Config {
                message: format!("cgroup {name} already exists"),
            },
            _ => map_create_error(&path, e),
        })?;
        let handle = CgroupHandle {
            name: name.to_string(),
            path,
        };
        tracing::info!(path = %handle.path.display(), "cgroup created");

        if let Err(e) = write_limits(&handle.path, limits).and_then(|()| add_self(&handle.path)) {
            tracing::warn!(error = %e, "cgroup setup failed, removing group");
            if let Err(cleanup) = std::fs::remove_dir(&handle.path) {
                tracing::warn!(path = %handle.path.display(), error = %cleanup, "could not remove cgroup");
            }
            return Err(e);
        }
        Ok(handle)
    }

    /// Returns a handle to an existing group, e.g. one created by another
    /// process that has since exec'd.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::Config`] if `name` is not a valid group name.
    pub fn open(&self, name: &str) -> Result<CgroupHandle> {
        validate_group_name(name)?;
        Ok(CgroupHandle {
            name: name.to_string(),
            path: self.group_path(name),
        })
    }

    /// Removes the group. Releasing a group that no longer exists succeeds.
    ///
    /// The kernel refuses to remove a group while it still has members, which
    /// can briefly be the case right after the container's init exits, so
    /// `EBUSY` is retried a few times.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::Io`] if the directory cannot be removed.
    pub fn release(&self, handle: CgroupHandle) -> Result<()> {
        remove_group(&handle.path, || std::fs::remove_dir(&handle.path))
    }

    /// Opens what [`PinnedRelease::release`] needs while the hierarchy is
    /// still reachable, so the group can be removed after a root change.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::Io`] if the hierarchy root's `cgroup.procs` or
    /// the parent group directory cannot be opened.
    pub fn pin_release(&self, handle: CgroupHandle) -> Result<PinnedRelease> {
        let procs_path = self.root.join("cgroup.procs");
        let root_procs = std::fs::OpenOptions::new()
            .write(true)
            .open(&procs_path)
            .map_err(|e| CfsError::io(&procs_path, e))?;
        let parent_path = self.parent_path();
        let parent = std::fs::File::open(&parent_path).map_err(|e| CfsError::io(&parent_path, e))?;
        let name = CString::new(handle.name.as_bytes()).map_err(|_| CfsError::Config {
            message: format!("invalid cgroup name: {:?}", handle.name),
        })?;
        Ok(PinnedRelease {
            handle,
            root_procs,
            parent,
            name,
        })
    }

    /// Checks controller availability and enables them for the parent's
    /// children.
    fn prepare_parent(&self, controllers: &[&'static str]) -> Result<()> {
        ensure_controllers(&self.root, controllers)?;

        if !controllers.is_empty() {
            if let Err(e) = enable_controllers(&self.root, controllers) {
                // The hierarchy root may be a delegated group that already
                // enables what we need; the parent check below decides.
                tracing::debug!(error = %e, "could not enable controllers at hierarchy root");
            }
        }

        let parent = self.parent_path();
        std::fs::create_dir_all(&parent).map_err(|e| map_create_error(&parent, e))?;
        ensure_controllers(&parent, controllers)?;
        if !controllers.is_empty() {
            enable_controllers(&parent, controllers)?;
        }
        Ok(())
    }
}

/// A group whose removal works without path access to the hierarchy.
///
/// Holds descriptors for the hierarchy root's `cgroup.procs` and for the
/// parent group directory, both close-on-exec.
#[derive(Debug)]
pub struct PinnedRelease {
    handle: CgroupHandle,
    root_procs: std::fs::File,
    parent: std::fs::File,
    name: CString,
}

impl PinnedRelease {
    /// The group this release removes.
    #[must_use]
    pub const fn handle(&self) -> &CgroupHandle {
        &self.handle
    }

    /// Moves the calling process out of the group, then removes it through
    /// `syscall`.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::Io`] if the process cannot be moved or the group
    /// directory cannot be removed.
    pub fn release(mut self, syscall: &dyn Syscall) -> Result<()> {
        let pid = std::process::id();
        self.root_procs
            .write_all(pid.to_string().as_bytes())
            .map_err(|e| CfsError::io(&self.handle.path, e))?;
        let parent = self.parent.as_fd();
        remove_group(&self.handle.path, || syscall.remove_cgroup_at(parent, &self.name))
    }
}

/// Runs `remove` until it succeeds, the group is gone, or the kernel keeps
/// reporting it busy.
fn remove_group(path: &Path, mut remove: impl FnMut() -> std::io::Result<()>) -> Result<()> {
    for attempt in 1..=RELEASE_ATTEMPTS {
        match remove() {
            Ok(()) => {
                tracing::info!(path = %path.display(), "cgroup released");
                return Ok(());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EBUSY) && attempt < RELEASE_ATTEMPTS => {
                tracing::debug!(attempt, "cgroup busy, retrying release");
                std::thread::sleep(Duration::from_millis(10 * u64::from(attempt)));
            }
            Err(e) => return Err(CfsError::io(path, e)),
        }
    }
    Err(CfsError::io(path, std::io::Error::from_raw_os_error(libc::EBUSY)))
}

/// Controllers that must be enabled for `limits` to be enforced.
#[must_use]
pub fn required_controllers(limits: &ResourceLimits) -> Vec<&'static str> {
    let mut controllers = Vec::new();
    if limits.max_pids.is_some() {
        controllers.push("pids");
    }
    if limits.max_memory_bytes.is_some() {
        controllers.push("memory");
    }
    if limits.cpu_max.is_some() {
        controllers.push("cpu");
    }
    controllers
}

fn validate_group_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(CfsError::Config {
            message: format!("invalid cgroup name: {name:?}"),
        });
    }
    Ok(())
}

fn map_create_error(path: &Path, e: std::io::Error) -> CfsError {
    match e.kind() {
        ErrorKind::PermissionDenied => CfsError::PermissionDenied {
            message: format!("cannot create cgroup {}: {e}", path.display()),
        },
        ErrorKind::NotFound => CfsError::resource_control_unavailable(format!(
            "cgroup hierarchy missing at {}",
            path.display()
        )),
        _ => CfsError::io(path, e),
    }
}

/// Fails unless every controller is listed in `<group>/cgroup.controllers`.
fn ensure_controllers(group: &Path, controllers: &[&'static str]) -> Result<()> {
    let file = group.join("cgroup.controllers");
    let available = std::fs::read_to_string(&file).map_err(|e| {
        CfsError::resource_control_unavailable(format!("cannot read {}: {e}", file.display()))
    })?;
    let missing: Vec<_> = controllers
        .iter()
        .filter(|c| !available.split_whitespace().any(|a| a == **c))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CfsError::resource_control_unavailable(format!(
            "controller(s) {} not available in {}",
            missing.join(", "),
            group.display()
        )));
    }
    Ok(())
}

fn enable_controllers(group: &Path, controllers: &[&'static str]) -> Result<()> {
    let file = group.join("cgroup.subtree_control");
    let value = controllers
        .iter()
        .map(|c| format!("+{c}"))
        .collect::<Vec<_>>()
        .join(" ");
    std::fs::write(&file, &value).map_err(|e| {
        CfsError::resource_control_unavailable(format!(
            "cannot enable {value} in {}: {e}",
            file.display()
        ))
    })?;
    tracing::debug!(group = %group.display(), controllers = %value, "controllers enabled");
    Ok(())
}

fn write_limits(path: &Path, limits: &ResourceLimits) -> Result<()> {
    if let Some(max) = limits.max_pids {
        pids::set_pids_max(path, max)?;
    }
    if let Some(bytes) = limits.max_memory_bytes {
        memory::set_memory_max(path, bytes)?;
        memory::disable_swap(path)?;
    }
    if let Some(cpu) = limits.cpu_max {
        cpu::set_cpu_max(path, cpu.quota_us, cpu.period_us)?;
    }
    Ok(())
}

/// Moves the calling process into the group by writing its PID.
fn add_self(path: &Path) -> Result<()> {
    let pid = std::process::id();
    let procs_path = path.join("cgroup.procs");
    std::fs::write(&procs_path, pid.to_string()).map_err(|e| CfsError::io(procs_path, e))?;
    tracing::debug!(pid, "added process to cgroup");
    Ok(())
}
