//! Hidden `child` subcommand: the container bootstrap.
//!
//! Only the launcher invokes this, from inside the new namespaces, with the
//! argument vector rendered by [`Handoff::to_args`]. The cgroup hierarchy
//! and parent group arrive through the global `--cgroup-root` and
//! `--cgroup-parent` flags.

use std::ffi::OsString;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;

use cfs_common::constants::{EXIT_BOOTSTRAP_FAILED, HANDOFF_VERSION};
use cfs_common::error::{CfsError, Result};
use cfs_common::types::{CpuMax, ResourceLimits};
use cfs_runtime::handoff::Handoff;

use super::{GlobalArgs, exit_status};

/// Arguments for the `child` command.
#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Version of the argument vector.
    #[arg(value_name = "VERSION", value_parser = [HANDOFF_VERSION])]
    pub handoff_version: String,

    /// Leaf cgroup created for this container.
    #[arg(long = "cgroup")]
    pub cgroup_name: String,

    /// Hostname inside the container.
    #[arg(long)]
    pub hostname: String,

    /// Write end of the launcher's status pipe.
    #[arg(long)]
    pub status_fd: RawFd,

    /// Maximum number of processes.
    #[arg(long)]
    pub pids: Option<u64>,

    /// Memory ceiling in bytes.
    #[arg(long)]
    pub memory: Option<u64>,

    /// CPU bandwidth as `QUOTA:PERIOD` in microseconds.
    #[arg(long)]
    pub cpu_max: Option<CpuMax>,

    /// Image root, then the command and its arguments.
    #[arg(last = true, required = true, value_name = "IMAGE COMMAND")]
    pub rest: Vec<OsString>,
}

impl ChildArgs {
    /// Rebuilds what the launcher handed over.
    ///
    /// # Errors
    ///
    /// Returns [`CfsError::Handoff`] if the image or command is missing, or
    /// the command line is not valid UTF-8.
    pub fn into_handoff(self, global: &GlobalArgs) -> Result<Handoff> {
        let mut rest = self.rest.into_iter();
        let image_path = rest
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| CfsError::handoff("missing image path"))?;
        let command = rest
            .next()
            .ok_or_else(|| CfsError::handoff("missing command"))
            .and_then(utf8)?;
        let args = rest.map(utf8).collect::<Result<Vec<_>>>()?;

        Ok(Handoff {
            cgroup_root: global.cgroup_root.clone(),
            cgroup_parent: global.cgroup_parent.clone(),
            cgroup_name: self.cgroup_name,
            hostname: self.hostname,
            status_fd: self.status_fd,
            limits: ResourceLimits {
                max_pids: self.pids,
                max_memory_bytes: self.memory,
                cpu_max: self.cpu_max,
            },
            image_path,
            command,
            args,
        })
    }
}

fn utf8(value: OsString) -> Result<String> {
    value
        .into_string()
        .map_err(|raw| CfsError::handoff(format!("argument {raw:?} is not valid UTF-8")))
}

/// Runs the bootstrap. Returns only if it failed before exec.
pub fn execute(args: ChildArgs, global: &GlobalArgs) -> ExitCode {
    match args.into_handoff(global) {
        Ok(handoff) => exit_status(cfs_runtime::bootstrap::main(handoff)),
        Err(e) => {
            tracing::error!(error = %e, "bootstrap started with a bad argument vector");
            exit_status(EXIT_BOOTSTRAP_FAILED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Command};
    use clap::Parser;

    fn parse<I, S>(argv: I) -> std::result::Result<(ChildArgs, GlobalArgs), clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let argv = std::iter::once(OsString::from("cfs")).chain(argv.into_iter().map(Into::into));
        let cli = Cli::try_parse_from(argv)?;
        let Command::Child(args) = cli.command else {
            panic!("expected child");
        };
        Ok((args, cli.global))
    }

    fn sample() -> Handoff {
        Handoff {
            cgroup_root: "/sys/fs/cgroup".into(),
            cgroup_parent: "cfs".into(),
            cgroup_name: "0b6f3c1e".into(),
            hostname: "container".into(),
            status_fd: 7,
            limits: ResourceLimits {
                max_pids: Some(64),
                max_memory_bytes: Some(1024),
                cpu_max: Some(CpuMax {
                    quota_us: 50_000,
                    period_us: 100_000,
                }),
            },
            image_path: "/images/alpine".into(),
            command: "/bin/sh".into(),
            args: vec!["-c".into(), "echo -- --pids 3".into()],
        }
    }

    fn required(extra: &[&str]) -> Vec<String> {
        let mut argv: Vec<String> = [
            "child", "v1", "--cgroup", "x", "--hostname", "h", "--status-fd", "3",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        argv.extend(extra.iter().map(ToString::to_string));
        argv
    }

    #[test]
    fn rendered_handoff_parses_back() {
        let handoff = sample();
        let (args, global) = parse(handoff.to_args()).expect("parse");
        assert_eq!(args.into_handoff(&global).expect("handoff"), handoff);
    }

    #[test]
    fn short_alias_reaches_the_bootstrap() {
        let mut argv = required(&["--", "/img", "/bin/true"]);
        argv[0] = "c".into();
        let (args, global) = parse(argv).expect("parse");
        let handoff = args.into_handoff(&global).expect("handoff");
        assert_eq!(handoff.command, "/bin/true");
        assert_eq!(handoff.cgroup_parent, "cfs");
    }

    #[test]
    fn command_arguments_after_separator_are_not_flags() {
        let (args, global) =
            parse(required(&["--", "/img", "/bin/ls", "--cgroup", "-l"])).expect("parse");
        let handoff = args.into_handoff(&global).expect("handoff");
        assert_eq!(handoff.args, ["--cgroup", "-l"]);
        assert!(handoff.limits.is_unbounded());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut argv = required(&["--", "/img", "/bin/sh"]);
        argv[1] = "v2".into();
        assert!(parse(argv).is_err());
    }

    #[test]
    fn missing_separator_is_rejected() {
        assert!(parse(required(&["/img", "/bin/sh"])).is_err());
    }

    #[test]
    fn missing_required_flag_is_rejected() {
        let err = parse(["child", "v1", "--hostname", "h", "--", "/img", "/bin/sh"])
            .err()
            .expect("missing flags");
        assert!(err.to_string().contains("--cgroup"));
    }

    #[test]
    fn duplicate_and_unknown_flags_are_rejected() {
        assert!(parse(required(&["--hostname", "again", "--", "/img", "/bin/sh"])).is_err());
        assert!(parse(required(&["--net", "host", "--", "/img", "/bin/sh"])).is_err());
    }

    #[test]
    fn non_numeric_limit_is_rejected() {
        let err = parse(required(&["--pids", "many", "--", "/img", "/bin/sh"]))
            .err()
            .expect("bad number");
        assert!(err.to_string().contains("--pids"));
    }

    #[test]
    fn image_without_command_is_a_handoff_error() {
        let (args, global) = parse(required(&["--", "/img"])).expect("parse");
        let err = args.into_handoff(&global).expect_err("no command");
        assert!(matches!(err, CfsError::Handoff { .. }));
    }
}
