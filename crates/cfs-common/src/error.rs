//! Unified error types for the CFS workspace.
//!
//! Every crate returns [`CfsError`]. The first five variants are the runtime's
//! public taxonomy; the rest describe lower-level failures that callers
//! usually only log.

use std::path::PathBuf;

use thiserror::Error;

use crate::constants::{EXIT_BOOTSTRAP_FAILED, EXIT_CANNOT_EXECUTE, EXIT_COMMAND_NOT_FOUND};

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CfsError {
    /// The container spec was rejected before any process was created.
    #[error("invalid container spec: {message}")]
    InvalidSpec {
        /// Why the container spec was rejected.
        message: String,
    },

    /// A privileged namespace, mount or jail operation was not allowed.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// The cgroup v2 hierarchy or one of its controllers is missing.
    #[error("resource control unavailable: {message}")]
    ResourceControlUnavailable {
        /// What is missing or misconfigured.
        message: String,
    },

    /// The target command could not be executed inside the container.
    #[error("failed to execute {command}: {message}")]
    ExecFailed {
        /// Command that was being executed.
        command: String,
        /// Underlying failure.
        message: String,
        /// The command does not exist in the image.
        not_found: bool,
    },

    /// The container process was killed by a signal.
    #[error("container terminated by signal {name} ({signal})")]
    TerminatedBySignal {
        /// Raw signal number.
        signal: i32,
        /// Symbolic signal name, e.g. `SIGKILL`.
        name: String,
    },

    /// The root jail was already applied in this process.
    #[error("root jail already applied (current root: {root})")]
    AlreadyJailed {
        /// Root the process is already jailed into.
        root: PathBuf,
    },

    /// The bootstrap argument vector is malformed.
    #[error("malformed bootstrap handoff: {message}")]
    Handoff {
        /// Description of the problem.
        message: String,
    },

    /// A kernel call failed for a reason other than missing privilege.
    #[error("{operation} failed: {message}")]
    Syscall {
        /// Name of the failing operation.
        operation: &'static str,
        /// Errno description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl CfsError {
    /// Shorthand for [`CfsError::InvalidSpec`].
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Shorthand for [`CfsError::ResourceControlUnavailable`].
    pub fn resource_control_unavailable(message: impl Into<String>) -> Self {
        Self::ResourceControlUnavailable {
            message: message.into(),
        }
    }

    /// Shorthand for [`CfsError::Handoff`].
    pub fn handoff(message: impl Into<String>) -> Self {
        Self::Handoff {
            message: message.into(),
        }
    }

    /// Process exit status that reports this error, following shell
    /// conventions: 127 for a missing command, 126 for one that cannot be
    /// executed, `128 + n` for death by signal `n`, 125 for anything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ExecFailed {
                not_found: true, ..
            } => EXIT_COMMAND_NOT_FOUND,
            Self::ExecFailed { .. } => EXIT_CANNOT_EXECUTE,
            Self::TerminatedBySignal { signal, .. } => 128 + *signal,
            _ => EXIT_BOOTSTRAP_FAILED,
        }
    }

    /// Wraps an I/O error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CfsError>;
