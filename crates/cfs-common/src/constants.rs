//! System-wide constants and default paths.

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Parent cgroup under which every container gets its own leaf group.
pub const CGROUP_PARENT: &str = "cfs";

/// Hostname given to containers unless configured otherwise.
pub const DEFAULT_HOSTNAME: &str = "container";

/// Longest hostname accepted by `sethostname(2)` (`HOST_NAME_MAX`).
pub const HOST_NAME_MAX: usize = 64;

/// Reserved subcommand the launcher re-executes the binary with.
pub const BOOTSTRAP_SUBCOMMAND: &str = "child";

/// Short alias of [`BOOTSTRAP_SUBCOMMAND`].
pub const BOOTSTRAP_ALIAS: &str = "c";

/// Version tag of the bootstrap argument vector.
pub const HANDOFF_VERSION: &str = "v1";

/// Mount point of the process-information filesystem inside the jail.
pub const PROC_MOUNT_POINT: &str = "/proc";

/// Exit status of a bootstrap that failed before exec.
pub const EXIT_BOOTSTRAP_FAILED: i32 = 125;

/// Exit status when the command exists but cannot be executed.
pub const EXIT_CANNOT_EXECUTE: i32 = 126;

/// Exit status when the command cannot be found inside the image.
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Default `PATH` used to resolve bare command names inside the image.
pub const DEFAULT_CONTAINER_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Default bind address of the HTTP façade.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:1337";

/// Default process ceiling per container.
pub const DEFAULT_MAX_PIDS: u64 = 64;

/// Default memory ceiling per container (512 MiB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "cfs";
