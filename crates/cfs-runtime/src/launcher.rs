//! Host side of a container launch.
//!
//! [`Launcher::run`] validates the container spec, clones a child into new PID, UTS
//! and mount namespaces and has that child re-execute the runtime binary as
//! the bootstrap. It then blocks until the container exits and maps the
//! wait status onto an exit code or an error.

use std::ffi::CString;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{AccessFlags, Pid, access};

use cfs_common::config::RuntimeConfig;
use cfs_common::constants::EXIT_BOOTSTRAP_FAILED;
use cfs_common::error::{CfsError, Result};
use cfs_common::types::ContainerSpec;
use cfs_core::cgroup::CgroupManager;
use cfs_core::namespace::NamespaceSet;
use cfs_core::syscall::errno_to_error;

use crate::handoff::Handoff;
use crate::status::{self, BootstrapStatus, FailureKind, FailureReport};

/// Stack handed to the cloned child. It only runs until `execv`.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Runs `spec` with `config` and waits for it.
///
/// # Errors
///
/// See [`Launcher::run`].
pub fn run(spec: &ContainerSpec, config: &RuntimeConfig) -> Result<i32> {
    Launcher::new(config.clone())?.run(spec)
}

/// Starts containers and waits for them to finish.
#[derive(Debug, Clone)]
pub struct Launcher {
    config: RuntimeConfig,
    executable: PathBuf,
    namespaces: NamespaceSet,
}

impl Launcher {
    /// Creates a launcher that re-executes the current binary.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the running executable
    /// cannot be located.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        let executable =
            std::env::current_exe().map_err(|e| CfsError::io("/proc/self/exe", e))?;
        Ok(Self {
            config,
            executable,
            namespaces: NamespaceSet::default(),
        })
    }

    /// Re-executes `path` instead of the current binary. It must accept the
    /// bootstrap subcommand.
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    /// Creates `namespaces` instead of the full PID, UTS and mount set.
    #[must_use]
    pub const fn with_namespaces(mut self, namespaces: NamespaceSet) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Configuration every container of this launcher shares.
    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Runs the container described by `spec` to completion.
    ///
    /// Returns the command's exit code. The container's cgroup is released
    /// before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`CfsError::InvalidSpec`] before anything is created, if the image
    ///   or command is unusable.
    /// - [`CfsError::PermissionDenied`] without the privileges to create
    ///   namespaces, mount or change root.
    /// - [`CfsError::ResourceControlUnavailable`] if cgroup v2 or a needed
    ///   controller is missing.
    /// - [`CfsError::ExecFailed`] if the command cannot be executed.
    /// - [`CfsError::TerminatedBySignal`] if the command was killed.
    pub fn run(&self, spec: &ContainerSpec) -> Result<i32> {
        let image = validate_spec(spec)?;
        let cgroup_name = uuid::Uuid::new_v4().simple().to_string();
        let (sender, receiver) = status::channel()?;
        let handoff = Handoff {
            cgroup_root: self.config.cgroup_root.clone(),
            cgroup_parent: self.config.cgroup_parent.clone(),
            cgroup_name: cgroup_name.clone(),
            hostname: self.config.hostname.clone(),
            status_fd: sender.as_raw_fd(),
            limits: spec.limits().clone(),
            image_path: image,
            command: spec.command().to_string(),
            args: spec.args().to_vec(),
        };

        let child = self.spawn(&handoff)?;
        drop(sender);
        tracing::info!(
            pid = %child,
            cgroup = %cgroup_name,
            image = %handoff.image_path.display(),
            command = %handoff.command,
            "container started"
        );

        let bootstrap = receiver.wait();
        let status = wait_for(child);
        self.release(&cgroup_name);

        match bootstrap {
            Ok(BootstrapStatus::Started) => {}
            Ok(BootstrapStatus::Failed(report)) => return Err(report.into_error()),
            Ok(BootstrapStatus::Silent) => {
                return Err(CfsError::handoff(format!(
                    "{} exited without starting the bootstrap",
                    self.executable.display()
                )));
            }
            Err(e) => tracing::warn!(error = %e, "unreadable bootstrap status"),
        }
        let code = exit_code(status?)?;
        tracing::info!(pid = %child, code, "container exited");
        Ok(code)
    }

    /// Clones the bootstrap process into fresh namespaces.
    fn spawn(&self, handoff: &Handoff) -> Result<Pid> {
        let program = CString::new(self.executable.as_os_str().as_bytes()).map_err(|_| {
            CfsError::Config {
                message: format!("executable path {} contains a NUL byte", self.executable.display()),
            }
        })?;
        let mut argv = vec![program.clone()];
        for arg in handoff.to_args() {
            argv.push(
                CString::new(arg.into_vec())
                    .map_err(|_| CfsError::invalid_spec("arguments must not contain NUL bytes"))?,
            );
        }
        let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        let reexec_failed = serde_json::to_vec(&FailureReport {
            kind: FailureKind::Handoff,
            message: format!("cannot re-execute {}", self.executable.display()),
            command: None,
            not_found: false,
        })?;
        let status_fd = handoff.status_fd;
        let mut stack = vec![0u8; CHILD_STACK_SIZE];
        // Runs in the child between clone and exec: no allocation, no locks.
        let child = Box::new(|| -> isize {
            // SAFETY: only async-signal-safe calls on data prepared by the
            // parent; `argv_ptrs` is NULL-terminated and its strings are
            // kept alive by `argv`.
            unsafe {
                if libc::fcntl(status_fd, libc::F_SETFD, 0) == 0 {
                    let _ = libc::execv(program.as_ptr(), argv_ptrs.as_ptr());
                }
                let _ = libc::write(status_fd, reexec_failed.as_ptr().cast(), reexec_failed.len());
                libc::_exit(EXIT_BOOTSTRAP_FAILED)
            }
        });

        // SAFETY: the child never returns into Rust code of the parent's
        // address-space copy; it either execs or calls `_exit`.
        let pid = unsafe {
            nix::sched::clone(
                child,
                &mut stack,
                self.namespaces.clone_flags(),
                Some(Signal::SIGCHLD as libc::c_int),
            )
        }
        .map_err(|e| errno_to_error("clone", e))?;
        Ok(pid)
    }

    fn release(&self, cgroup_name: &str) {
        let manager = CgroupManager::from_config(&self.config);
        if let Err(e) = manager.open(cgroup_name).and_then(|handle| manager.release(handle)) {
            tracing::warn!(cgroup = %cgroup_name, error = %e, "could not release cgroup");
        }
    }
}

/// Checks `spec` against the host and returns the canonical image root.
///
/// # Errors
///
/// Returns [`CfsError::InvalidSpec`] if the command is empty, the limits
/// are degenerate, or the image is not a readable, searchable directory.
pub fn validate_spec(spec: &ContainerSpec) -> Result<PathBuf> {
    if spec.command().trim().is_empty() {
        return Err(CfsError::invalid_spec("command must not be empty"));
    }
    spec.limits().validate()?;

    let image = spec.image_path();
    let metadata = std::fs::metadata(image)
        .map_err(|e| CfsError::invalid_spec(format!("image {} is not accessible: {e}", image.display())))?;
    if !metadata.is_dir() {
        return Err(CfsError::invalid_spec(format!(
            "image {} is not a directory",
            image.display()
        )));
    }
    access(image, AccessFlags::R_OK | AccessFlags::X_OK).map_err(|e| {
        CfsError::invalid_spec(format!("image {} is not readable: {e}", image.display()))
    })?;
    canonical(image)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .map_err(|e| CfsError::invalid_spec(format!("cannot resolve {}: {e}", path.display())))
}

fn wait_for(pid: Pid) -> Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => {}
            other => return other.map_err(|e| errno_to_error("waitpid", e)),
        }
    }
}

/// Maps how the container's init ended onto the runtime's result.
///
/// # Errors
///
/// Returns [`CfsError::TerminatedBySignal`] for a killed process.
pub fn exit_code(status: WaitStatus) -> Result<i32> {
    match status {
        WaitStatus::Exited(_, code) => Ok(code),
        WaitStatus::Signaled(_, signal, _) => Err(CfsError::TerminatedBySignal {
            signal: signal as i32,
            name: signal.as_str().to_string(),
        }),
        other => Err(CfsError::Syscall {
            operation: "waitpid",
            message: format!("unexpected wait status {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfs_common::types::ResourceLimits;

    fn config_in(root: &Path) -> RuntimeConfig {
        RuntimeConfig {
            cgroup_root: root.to_path_buf(),
            ..RuntimeConfig::default()
        }
    }

    #[test]
    fn nonexistent_image_is_rejected_before_anything_is_created() {
        let cgroup = tempfile::tempdir().expect("cgroup root");
        let spec = ContainerSpec::builder("/nonexistent/image", "/bin/echo")
            .arg("hi")
            .build()
            .expect("spec");

        let err = run(&spec, &config_in(cgroup.path())).expect_err("missing image");
        assert!(matches!(err, CfsError::InvalidSpec { .. }));
        assert!(err.to_string().starts_with("invalid container spec"));
        assert!(!cgroup.path().join("cfs").exists(), "no cgroup created");
    }

    #[test]
    fn file_image_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("alpine.tar");
        std::fs::write(&file, b"").expect("write");
        let spec = ContainerSpec::builder(&file, "/bin/sh").build().expect("spec");
        let err = validate_spec(&spec).expect_err("not a directory");
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn image_root_is_canonicalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("rootfs")).expect("rootfs");
        let spec = ContainerSpec::builder(dir.path().join("rootfs/../rootfs"), "/bin/sh")
            .limits(ResourceLimits {
                max_pids: Some(8),
                ..ResourceLimits::default()
            })
            .build()
            .expect("spec");
        let image = validate_spec(&spec).expect("valid");
        assert_eq!(image, dir.path().join("rootfs").canonicalize().expect("canonical"));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = RuntimeConfig {
            hostname: String::new(),
            ..RuntimeConfig::default()
        };
        let err = Launcher::new(config).expect_err("empty hostname");
        assert!(matches!(err, CfsError::InvalidSpec { .. }));
    }

    #[test]
    fn normal_exit_passes_code_through() {
        let pid = Pid::from_raw(42);
        assert_eq!(exit_code(WaitStatus::Exited(pid, 0)).expect("exit"), 0);
        assert_eq!(exit_code(WaitStatus::Exited(pid, 3)).expect("exit"), 3);
    }

    #[test]
    fn kill_maps_to_terminated_by_signal() {
        let status = WaitStatus::Signaled(Pid::from_raw(42), Signal::SIGKILL, false);
        let err = exit_code(status).expect_err("signal");
        let CfsError::TerminatedBySignal { signal, name } = err else {
            panic!("expected signal termination");
        };
        assert_eq!(signal, 9);
        assert_eq!(name, "SIGKILL");
    }

    fn plain_process() -> NamespaceSet {
        NamespaceSet {
            pid: false,
            uts: false,
            mount: false,
        }
    }

    fn echo_in(image: &Path) -> ContainerSpec {
        ContainerSpec::builder(image, "/bin/echo")
            .arg("hi")
            .build()
            .expect("spec")
    }

    #[test]
    fn missing_executable_is_a_handoff_error() {
        let cgroup = tempfile::tempdir().expect("cgroup root");
        let image = tempfile::tempdir().expect("image");
        let err = Launcher::new(config_in(cgroup.path()))
            .expect("launcher")
            .with_executable("/nonexistent/cfs")
            .with_namespaces(plain_process())
            .run(&echo_in(image.path()))
            .expect_err("re-exec cannot succeed");
        assert!(matches!(err, CfsError::Handoff { .. }), "{err}");
        assert!(err.to_string().contains("cannot re-execute /nonexistent/cfs"));
    }

    #[test]
    fn executable_ignoring_the_bootstrap_is_not_a_clean_exit() {
        if !Path::new("/bin/true").exists() {
            return;
        }
        let cgroup = tempfile::tempdir().expect("cgroup root");
        let image = tempfile::tempdir().expect("image");
        let err = Launcher::new(config_in(cgroup.path()))
            .expect("launcher")
            .with_executable("/bin/true")
            .with_namespaces(plain_process())
            .run(&echo_in(image.path()))
            .expect_err("bootstrap never ran");
        assert!(matches!(err, CfsError::Handoff { .. }), "{err}");
        assert!(err.to_string().contains("without starting the bootstrap"));
    }

    #[test]
    fn launcher_keeps_custom_executable() {
        let launcher = Launcher::new(RuntimeConfig::default())
            .expect("launcher")
            .with_executable("/usr/local/bin/cfs");
        assert_eq!(launcher.executable, Path::new("/usr/local/bin/cfs"));
        assert_eq!(launcher.config().hostname, "container");
    }
}
