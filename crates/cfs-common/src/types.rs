//! Domain primitive types used across the CFS workspace.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CfsError, Result};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CPU bandwidth ceiling: at most `quota_us` of CPU time per `period_us`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuMax {
    /// Allowed CPU time per period, in microseconds.
    pub quota_us: u64,
    /// Length of the accounting period, in microseconds.
    pub period_us: u64,
}

impl FromStr for CpuMax {
    type Err = CfsError;

    /// Parses `QUOTA:PERIOD`, e.g. `50000:100000` for half a CPU.
    fn from_str(s: &str) -> Result<Self> {
        let (quota, period) = s
            .split_once(':')
            .ok_or_else(|| CfsError::invalid_spec(format!("cpu max must be QUOTA:PERIOD, got {s:?}")))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| CfsError::invalid_spec(format!("invalid cpu max value: {v:?}")))
        };
        Ok(Self {
            quota_us: parse(quota)?,
            period_us: parse(period)?,
        })
    }
}

impl fmt::Display for CpuMax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.quota_us, self.period_us)
    }
}

/// Resource ceilings for a container. `None` leaves a resource unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of processes in the container's cgroup.
    pub max_pids: Option<u64>,
    /// Hard memory limit in bytes.
    pub max_memory_bytes: Option<u64>,
    /// CPU bandwidth ceiling.
    pub cpu_max: Option<CpuMax>,
}

impl ResourceLimits {
    /// Returns `true` when no ceiling is set at all.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.max_pids.is_none() && self.max_memory_bytes.is_none() && self.cpu_max.is_none()
    }

    /// Rejects zero-valued ceilings, which the kernel would accept but which
    /// make the container unable to run anything.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::InvalidSpec`] for a zero pid count, zero memory or
    /// a degenerate CPU period.
    pub fn validate(&self) -> Result<()> {
        if self.max_pids == Some(0) {
            return Err(CfsError::invalid_spec("max pids must be at least 1"));
        }
        if self.max_memory_bytes == Some(0) {
            return Err(CfsError::invalid_spec("memory limit must be positive"));
        }
        if let Some(cpu) = self.cpu_max {
            if cpu.quota_us == 0 || cpu.period_us == 0 {
                return Err(CfsError::invalid_spec("cpu quota and period must be positive"));
            }
        }
        Ok(())
    }
}

/// Parses memory strings like "128MiB", "256MB", "1GiB" into bytes.
#[must_use]
#[allow(clippy::option_if_let_else)]
pub fn parse_bytes(s: &str) -> Option<u64> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('B') {
        (n, 1)
    } else {
        (s, 1)
    };
    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
}

/// What to run and where: an image root, a command and its arguments.
///
/// Immutable once built; use [`ContainerSpec::builder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    image_path: PathBuf,
    command: String,
    args: Vec<String>,
    limits: ResourceLimits,
}

impl ContainerSpec {
    /// Starts building a spec for `command` inside `image_path`.
    #[must_use]
    pub fn builder(image_path: impl Into<PathBuf>, command: impl Into<String>) -> ContainerSpecBuilder {
        ContainerSpecBuilder {
            image_path: image_path.into(),
            command: command.into(),
            args: Vec::new(),
            limits: None,
        }
    }

    /// Root filesystem of the container.
    #[must_use]
    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    /// Program executed as PID 1 inside the container.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments passed to the command.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Resource ceilings for this container.
    #[must_use]
    pub const fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

/// Builder for [`ContainerSpec`].
#[derive(Debug)]
pub struct ContainerSpecBuilder {
    image_path: PathBuf,
    command: String,
    args: Vec<String>,
    limits: Option<ResourceLimits>,
}

impl ContainerSpecBuilder {
    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets explicit resource limits instead of the runtime defaults.
    #[must_use]
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Finishes the container spec, filling unset limits from `defaults`.
    ///
    /// Only checks what can be checked without touching the filesystem;
    /// the launcher verifies the image directory itself.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::InvalidSpec`] if the command or image path is
    /// empty, or if the limits are degenerate.
    pub fn build_with_defaults(self, defaults: &ResourceLimits) -> Result<ContainerSpec> {
        if self.command.trim().is_empty() {
            return Err(CfsError::invalid_spec("command must not be empty"));
        }
        if self.image_path.as_os_str().is_empty() {
            return Err(CfsError::invalid_spec("image path must not be empty"));
        }
        let limits = self.limits.unwrap_or_else(|| defaults.clone());
        limits.validate()?;
        Ok(ContainerSpec {
            image_path: self.image_path,
            command: self.command,
            args: self.args,
            limits,
        })
    }

    /// Finishes the container spec with no resource ceilings beyond those set explicitly.
    ///
    /// # Errors
    ///
    /// See [`ContainerSpecBuilder::build_with_defaults`].
    pub fn build(self) -> Result<ContainerSpec> {
        self.build_with_defaults(&ResourceLimits::default())
    }
}

/// Lifecycle state of a container as tracked by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Container process is running.
    Running,
    /// Container process exited (with any exit code).
    Exited,
    /// The runtime failed to start the container or it died from a signal.
    Failed,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
