//! Linux namespace management for container isolation.
//!
//! The launcher creates the namespaces in one `clone(2)`; the bootstrap
//! then configures them from the inside (hostname, mount propagation).

pub mod mount;
pub mod uts;

use nix::sched::CloneFlags;

/// Which namespaces a container gets, fixed when its process is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceSet {
    /// Isolate the process-id space; the container command becomes PID 1.
    pub pid: bool,
    /// Isolate hostname and domain name.
    pub uts: bool,
    /// Give the container its own mount table.
    pub mount: bool,
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self {
            pid: true,
            uts: true,
            mount: true,
        }
    }
}

impl NamespaceSet {
    /// Returns the `clone(2)` flags creating these namespaces.
    #[must_use]
    pub fn clone_flags(&self) -> CloneFlags {
        let mut flags = CloneFlags::empty();
        flags.set(CloneFlags::CLONE_NEWPID, self.pid);
        flags.set(CloneFlags::CLONE_NEWUTS, self.uts);
        flags.set(CloneFlags::CLONE_NEWNS, self.mount);
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_requests_pid_uts_and_mount() {
        let flags = NamespaceSet::default().clone_flags();
        assert!(flags.contains(CloneFlags::CLONE_NEWPID));
        assert!(flags.contains(CloneFlags::CLONE_NEWUTS));
        assert!(flags.contains(CloneFlags::CLONE_NEWNS));
        assert!(!flags.contains(CloneFlags::CLONE_NEWNET));
    }

    #[test]
    fn disabled_namespaces_are_left_out() {
        let set = NamespaceSet {
            pid: true,
            uts: false,
            mount: false,
        };
        assert_eq!(set.clone_flags(), CloneFlags::CLONE_NEWPID);
    }
}
