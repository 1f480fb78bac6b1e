//! Failure channel from the bootstrap back to the launcher.
//!
//! The launcher opens a close-on-exec pipe and hands the write end to the
//! bootstrap. The bootstrap first writes a one-byte start marker. On
//! success nothing else is written: exec of the target command closes the
//! descriptor and the launcher reads EOF. On failure the bootstrap writes
//! one JSON [`FailureReport`] before exiting, so the launcher can surface a
//! typed error instead of a bare exit code.
//!
//! A pipe that closes without the marker means the re-executed binary never
//! reached the bootstrap at all.

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use nix::fcntl::OFlag;
use serde::{Deserialize, Serialize};

use cfs_common::error::{CfsError, Result};
use cfs_core::syscall::errno_to_error;

/// First byte the bootstrap writes. Reports are JSON objects, so they never
/// start with it.
const STARTED: u8 = b'+';

/// Error category carried across the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Maps to [`CfsError::InvalidSpec`].
    InvalidSpec,
    /// Maps to [`CfsError::PermissionDenied`].
    PermissionDenied,
    /// Maps to [`CfsError::ResourceControlUnavailable`].
    ResourceControlUnavailable,
    /// Maps to [`CfsError::ExecFailed`].
    ExecFailed,
    /// Maps to [`CfsError::AlreadyJailed`].
    AlreadyJailed,
    /// Maps to [`CfsError::Handoff`].
    Handoff,
    /// Anything else; surfaced as a bootstrap syscall failure.
    Other,
}

/// What went wrong inside the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Error category.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
    /// Command that failed to execute, for [`FailureKind::ExecFailed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Whether that command was missing from the image.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_found: bool,
}

impl FailureReport {
    /// Captures `err` for transport.
    #[must_use]
    pub fn from_error(err: &CfsError) -> Self {
        let not_found = matches!(err, CfsError::ExecFailed { not_found: true, .. });
        let (kind, message, command) = match err {
            CfsError::InvalidSpec { message } => (FailureKind::InvalidSpec, message.clone(), None),
            CfsError::PermissionDenied { message } => {
                (FailureKind::PermissionDenied, message.clone(), None)
            }
            CfsError::ResourceControlUnavailable { message } => {
                (FailureKind::ResourceControlUnavailable, message.clone(), None)
            }
            CfsError::ExecFailed {
                command, message, ..
            } => {
                (FailureKind::ExecFailed, message.clone(), Some(command.clone()))
            }
            CfsError::AlreadyJailed { root } => {
                (FailureKind::AlreadyJailed, root.display().to_string(), None)
            }
            CfsError::Handoff { message } => (FailureKind::Handoff, message.clone(), None),
            other => (FailureKind::Other, other.to_string(), None),
        };
        Self {
            kind,
            message,
            command,
            not_found,
        }
    }

    /// Rebuilds the error on the launcher side.
    #[must_use]
    pub fn into_error(self) -> CfsError {
        let Self {
            kind,
            message,
            command,
            not_found,
        } = self;
        match kind {
            FailureKind::InvalidSpec => CfsError::InvalidSpec { message },
            FailureKind::PermissionDenied => CfsError::PermissionDenied { message },
            FailureKind::ResourceControlUnavailable => {
                CfsError::ResourceControlUnavailable { message }
            }
            FailureKind::ExecFailed => CfsError::ExecFailed {
                command: command.unwrap_or_default(),
                message,
                not_found,
            },
            FailureKind::AlreadyJailed => CfsError::AlreadyJailed {
                root: message.into(),
            },
            FailureKind::Handoff => CfsError::Handoff { message },
            FailureKind::Other => CfsError::Syscall {
                operation: "bootstrap",
                message,
            },
        }
    }
}

/// What the launcher learned from the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    /// The bootstrap ran and exec'd the container command.
    Started,
    /// Setup failed; the report says why.
    Failed(FailureReport),
    /// The pipe closed without a word: the bootstrap never ran.
    Silent,
}

/// Launcher side of the channel.
#[derive(Debug)]
pub struct StatusReceiver {
    file: File,
}

/// Bootstrap side of the channel.
#[derive(Debug)]
pub struct StatusSender {
    file: File,
}

/// Opens a status channel. Both ends are close-on-exec.
///
/// # Errors
///
/// Returns an error if `pipe2(2)` fails.
pub fn channel() -> Result<(StatusSender, StatusReceiver)> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| errno_to_error("pipe2", e))?;
    Ok((
        StatusSender {
            file: File::from(write),
        },
        StatusReceiver {
            file: File::from(read),
        },
    ))
}

impl StatusReceiver {
    /// Blocks until every write end is closed and decodes what was sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipe cannot be read or carries something
    /// other than a report.
    pub fn wait(mut self) -> Result<BootstrapStatus> {
        let mut buf = Vec::new();
        let _ = self
            .file
            .read_to_end(&mut buf)
            .map_err(|e| CfsError::Syscall {
                operation: "read status pipe",
                message: e.to_string(),
            })?;
        let report = match buf.split_first() {
            None => return Ok(BootstrapStatus::Silent),
            Some((&STARTED, [])) => return Ok(BootstrapStatus::Started),
            Some((&STARTED, rest)) => rest,
            Some(_) => &buf[..],
        };
        Ok(BootstrapStatus::Failed(serde_json::from_slice(report)?))
    }
}

impl StatusSender {
    /// Raw descriptor to hand to the bootstrap.
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        std::os::fd::AsRawFd::as_raw_fd(&self.file)
    }

    /// Takes ownership of a descriptor inherited across exec and marks it
    /// close-on-exec again, so that it closes when the target command
    /// replaces the bootstrap.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::Handoff`] if `fd` is not an open descriptor.
    pub fn adopt(fd: RawFd) -> Result<Self> {
        if fd < 0 {
            return Err(CfsError::handoff(format!("invalid status fd {fd}")));
        }
        // SAFETY: fcntl on an arbitrary integer is harmless; an unopened
        // descriptor fails with EBADF.
        if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
            return Err(CfsError::handoff(format!(
                "status fd {fd} is not open: {}",
                std::io::Error::last_os_error()
            )));
        }
        // SAFETY: the descriptor is open and was handed to this process for
        // its exclusive use.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            file: File::from(owned),
        })
    }

    /// Tells the launcher that the bootstrap is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn acknowledge(&mut self) -> Result<()> {
        self.file.write_all(&[STARTED]).map_err(|e| CfsError::Syscall {
            operation: "write status pipe",
            message: e.to_string(),
        })
    }

    /// Sends `report` and closes the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be written.
    pub fn send(mut self, report: &FailureReport) -> Result<()> {
        let payload = serde_json::to_vec(report)?;
        self.file.write_all(&payload).map_err(|e| CfsError::Syscall {
            operation: "write status pipe",
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledged_then_closed_reads_as_started() {
        let (mut sender, receiver) = channel().expect("channel");
        sender.acknowledge().expect("ack");
        drop(sender);
        assert_eq!(receiver.wait().expect("wait"), BootstrapStatus::Started);
    }

    #[test]
    fn closed_without_marker_reads_as_silent() {
        let (sender, receiver) = channel().expect("channel");
        drop(sender);
        assert_eq!(receiver.wait().expect("wait"), BootstrapStatus::Silent);
    }

    #[test]
    fn report_without_marker_still_decodes() {
        let (mut sender, receiver) = channel().expect("channel");
        let payload = serde_json::to_vec(&FailureReport::from_error(&CfsError::handoff("x")))
            .expect("serialize");
        sender.file.write_all(&payload).expect("write");
        drop(sender);
        let BootstrapStatus::Failed(report) = receiver.wait().expect("wait") else {
            panic!("expected a report");
        };
        assert_eq!(report.kind, FailureKind::Handoff);
    }

    #[test]
    fn report_crosses_the_pipe() {
        let (mut sender, receiver) = channel().expect("channel");
        sender.acknowledge().expect("ack");
        let err = CfsError::ExecFailed {
            command: "/bin/nope".into(),
            message: "ENOENT: No such file or directory".into(),
            not_found: true,
        };
        sender.send(&FailureReport::from_error(&err)).expect("send");

        let BootstrapStatus::Failed(report) = receiver.wait().expect("wait") else {
            panic!("expected a report");
        };
        assert_eq!(report.kind, FailureKind::ExecFailed);
        let back = report.into_error();
        assert_eq!(back.exit_code(), 127);
        let CfsError::ExecFailed { command, .. } = back else {
            panic!("expected exec failure");
        };
        assert_eq!(command, "/bin/nope");
    }

    #[test]
    fn taxonomy_survives_transport() {
        let err = CfsError::resource_control_unavailable("controller(s) pids not available");
        let back = FailureReport::from_error(&err).into_error();
        assert_eq!(back.to_string(), err.to_string());

        let io = CfsError::io("/img/proc", std::io::Error::from(std::io::ErrorKind::Other));
        let report = FailureReport::from_error(&io);
        assert_eq!(report.kind, FailureKind::Other);
        assert!(report.into_error().to_string().contains("/img/proc"));
    }

    #[test]
    fn report_wire_format_is_tagged_json() {
        let report = FailureReport::from_error(&CfsError::PermissionDenied {
            message: "chroot: EPERM".into(),
        });
        let json = serde_json::to_string(&report).expect("serialize");
        assert_eq!(json, r#"{"kind":"permission_denied","message":"chroot: EPERM"}"#);
    }

    #[test]
    fn garbage_on_the_pipe_is_an_error() {
        let (mut sender, receiver) = channel().expect("channel");
        sender.file.write_all(b"not json").expect("write");
        drop(sender);
        assert!(receiver.wait().is_err());
    }

    #[test]
    fn adopting_a_closed_fd_fails() {
        let err = StatusSender::adopt(-1).expect_err("negative fd");
        assert!(matches!(err, CfsError::Handoff { .. }));
    }
}
