//! Root jail: confines a process to an image directory.
//!
//! Applying the jail is a one-way transition. [`RootJail::apply`] consumes
//! the jail, and a per-process [`JailLatch`] rejects any second application,
//! even through a freshly constructed [`RootJail`].

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use cfs_common::constants::PROC_MOUNT_POINT;
use cfs_common::error::{CfsError, Result};

use super::mount::mount_proc;
use crate::syscall::Syscall;

/// Latch shared by every jail of the current process.
static PROCESS_JAIL: JailLatch = JailLatch::new();

/// Records whether (and where) a process has been jailed.
#[derive(Debug)]
pub struct JailLatch {
    root: Mutex<Option<PathBuf>>,
}

impl JailLatch {
    /// Creates an unset latch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: Mutex::new(None),
        }
    }

    /// The latch guarding the current process.
    #[must_use]
    pub fn process() -> &'static Self {
        &PROCESS_JAIL
    }

    /// Returns the root the process was jailed into, if any.
    #[must_use]
    pub fn jailed_root(&self) -> Option<PathBuf> {
        self.root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for JailLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated, not yet applied jail root.
pub struct RootJail<'a> {
    root: PathBuf,
    syscall: &'a dyn Syscall,
    latch: &'a JailLatch,
}

/// Proof that the current process runs inside a jail.
#[derive(Debug)]
pub struct Jailed {
    root: PathBuf,
}

impl Jailed {
    /// Host path that became `/`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl<'a> RootJail<'a> {
    /// Prepares a jail rooted at `root`, tracked by `latch`. Production code
    /// passes [`JailLatch::process`].
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::InvalidSpec`] if `root` does not exist or is not a
    /// directory.
    pub fn with_latch(root: &Path, syscall: &'a dyn Syscall, latch: &'a JailLatch) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            CfsError::invalid_spec(format!("jail root {} is not reachable: {e}", root.display()))
        })?;
        if !root.is_dir() {
            return Err(CfsError::invalid_spec(format!(
                "jail root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root,
            syscall,
            latch,
        })
    }

    /// Directory that will become `/`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Switches the process root to the jail and mounts `/proc` inside it.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::AlreadyJailed`] if this process was already
    /// jailed, [`CfsError::PermissionDenied`] without the privilege to
    /// change root or mount, or an I/O error if `/proc` cannot be created in
    /// the image.
    pub fn apply(self) -> Result<Jailed> {
        let mut jailed = self.latch.root.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(root) = jailed.as_ref() {
            return Err(CfsError::AlreadyJailed { root: root.clone() });
        }

        let proc_dir = self.root.join(PROC_MOUNT_POINT.trim_start_matches('/'));
        std::fs::create_dir_all(&proc_dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => CfsError::PermissionDenied {
                message: format!("cannot create {}: {e}", proc_dir.display()),
            },
            _ => CfsError::io(&proc_dir, e),
        })?;

        self.syscall.chroot(&self.root)?;
        *jailed = Some(self.root.clone());
        drop(jailed);
        self.syscall.chdir(Path::new("/"))?;
        mount_proc(self.syscall, Path::new(PROC_MOUNT_POINT))?;

        tracing::info!(root = %self.root.display(), "root jail applied");
        Ok(Jailed { root: self.root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::{RecordingSyscall, SyscallCall};

    #[test]
    fn missing_root_is_invalid_spec() {
        let syscall = RecordingSyscall::new();
        let latch = JailLatch::new();
        let err = RootJail::with_latch(Path::new("/definitely/not/here"), &syscall, &latch)
            .err()
            .expect("must fail");
        assert!(matches!(err, CfsError::InvalidSpec { .. }));
    }

    #[test]
    fn file_root_is_invalid_spec() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("rootfs.tar");
        std::fs::write(&file, b"").expect("write");
        let syscall = RecordingSyscall::new();
        let latch = JailLatch::new();
        let result = RootJail::with_latch(&file, &syscall, &latch);
        assert!(matches!(result, Err(CfsError::InvalidSpec { .. })));
    }

    #[test]
    fn apply_chroots_then_mounts_proc() {
        let image = tempfile::tempdir().expect("tempdir");
        let syscall = RecordingSyscall::new();
        let latch = JailLatch::new();
        let jail = RootJail::with_latch(image.path(), &syscall, &latch).expect("jail");
        let root = jail.root().to_path_buf();

        let jailed = jail.apply().expect("apply");
        assert_eq!(jailed.root(), root);
        assert!(root.join("proc").is_dir(), "proc mount point created in image");

        let calls = syscall.calls();
        assert_eq!(calls[0], SyscallCall::Chroot(root.clone()));
        assert_eq!(calls[1], SyscallCall::Chdir("/".into()));
        let SyscallCall::Mount(proc_mount) = &calls[2] else {
            panic!("expected proc mount, got {calls:?}");
        };
        assert_eq!(proc_mount.fstype.as_deref(), Some("proc"));
        assert_eq!(proc_mount.target, Path::new("/proc"));
        assert_eq!(latch.jailed_root(), Some(root));
    }

    #[test]
    fn second_application_is_rejected() {
        let image = tempfile::tempdir().expect("tempdir");
        let syscall = RecordingSyscall::new();
        let latch = JailLatch::new();
        let _jailed = RootJail::with_latch(image.path(), &syscall, &latch)
            .expect("jail")
            .apply()
            .expect("first apply");
        let calls_after_first = syscall.calls().len();

        let err = RootJail::with_latch(image.path(), &syscall, &latch)
            .expect("jail")
            .apply()
            .expect_err("second apply must be rejected");
        assert!(matches!(err, CfsError::AlreadyJailed { .. }));
        assert_eq!(syscall.calls().len(), calls_after_first, "no further syscalls");
    }

    #[test]
    fn missing_privilege_leaves_latch_unset() {
        let image = tempfile::tempdir().expect("tempdir");
        let syscall = RecordingSyscall::unprivileged();
        let latch = JailLatch::new();
        let err = RootJail::with_latch(image.path(), &syscall, &latch)
            .expect("jail")
            .apply()
            .expect_err("denied");
        assert!(matches!(err, CfsError::PermissionDenied { .. }));
        assert!(latch.jailed_root().is_none());
    }
}
