//! In-memory record of containers started through the HTTP façade.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use cfs_common::error::{CfsError, Result};
use cfs_common::types::{ContainerId, ContainerSpec, ContainerState};

/// One container as reported by `GET /run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRecord {
    /// Registry-assigned identifier.
    pub id: ContainerId,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Image root the container ran in.
    pub image: String,
    /// Command executed as PID 1.
    pub command: String,
    /// Arguments of the command.
    pub args: Vec<String>,
    /// Exit code, once the command exited normally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Why the container failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the container finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Shared, insertion-ordered list of container records.
///
/// Cloning is cheap and every clone sees the same records.
#[derive(Debug, Clone, Default)]
pub struct ContainerRegistry {
    records: Arc<RwLock<Vec<ContainerRecord>>>,
}

impl ContainerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `spec` as a running container and returns its id.
    pub fn create(&self, spec: &ContainerSpec) -> ContainerId {
        let record = ContainerRecord {
            id: ContainerId::generate(),
            state: ContainerState::Running,
            image: spec.image_path().display().to_string(),
            command: spec.command().to_string(),
            args: spec.args().to_vec(),
            exit_code: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        let id = record.id.clone();
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        tracing::debug!(id = %id, "container registered");
        id
    }

    /// All records, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<ContainerRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The record with `id`, if any.
    #[must_use]
    pub fn get(&self, id: &ContainerId) -> Option<ContainerRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == *id)
            .cloned()
    }

    /// Records how the container ended. Returns `false` if `id` is unknown.
    pub fn finish(&self, id: &ContainerId, outcome: &Result<i32>) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let Some(record) = records.iter_mut().find(|r| r.id == *id) else {
            return false;
        };
        match outcome {
            Ok(code) => {
                record.state = ContainerState::Exited;
                record.exit_code = Some(*code);
            }
            Err(e) => {
                record.state = ContainerState::Failed;
                record.error = Some(e.to_string());
                if let CfsError::TerminatedBySignal { signal, .. } = e {
                    record.exit_code = Some(128 + signal);
                }
            }
        }
        record.finished_at = Some(Utc::now());
        tracing::debug!(id = %id, state = %record.state, "container finished");
        true
    }

    /// Drops the record with `id` and returns it.
    pub fn remove(&self, id: &ContainerId) -> Option<ContainerRecord> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let index = records.iter().position(|r| r.id == *id)?;
        Some(records.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec::builder("/images/alpine", "/bin/echo")
            .arg("hi")
            .build()
            .expect("spec")
    }

    #[test]
    fn created_records_start_running() {
        let registry = ContainerRegistry::new();
        let id = registry.create(&spec());
        let record = registry.get(&id).expect("record");
        assert_eq!(record.state, ContainerState::Running);
        assert_eq!(record.image, "/images/alpine");
        assert_eq!(record.args, ["hi"]);
        assert!(record.finished_at.is_none());
    }

    #[test]
    fn finish_records_exit_code() {
        let registry = ContainerRegistry::new();
        let id = registry.create(&spec());
        assert!(registry.finish(&id, &Ok(3)));
        let record = registry.get(&id).expect("record");
        assert_eq!(record.state, ContainerState::Exited);
        assert_eq!(record.exit_code, Some(3));
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn signal_death_is_a_failure_with_shell_code() {
        let registry = ContainerRegistry::new();
        let id = registry.create(&spec());
        let outcome = Err(CfsError::TerminatedBySignal {
            signal: 9,
            name: "SIGKILL".into(),
        });
        assert!(registry.finish(&id, &outcome));
        let record = registry.get(&id).expect("record");
        assert_eq!(record.state, ContainerState::Failed);
        assert_eq!(record.exit_code, Some(137));
        assert!(record.error.expect("error").contains("SIGKILL"));
    }

    #[test]
    fn finishing_unknown_id_reports_false() {
        let registry = ContainerRegistry::new();
        assert!(!registry.finish(&ContainerId::new("ghost"), &Ok(0)));
    }

    #[test]
    fn list_keeps_insertion_order_and_remove_drops() {
        let registry = ContainerRegistry::new();
        let first = registry.create(&spec());
        let second = registry.create(&spec());
        let ids: Vec<_> = registry.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, [first.clone(), second.clone()]);

        assert!(registry.remove(&first).is_some());
        assert!(registry.remove(&first).is_none());
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].id, second);
    }

    #[test]
    fn clones_share_records() {
        let registry = ContainerRegistry::new();
        let handle = registry.clone();
        let id = registry.create(&spec());
        assert!(handle.get(&id).is_some());
    }

    #[test]
    fn record_serializes_lowercase_state_and_skips_empty_fields() {
        let registry = ContainerRegistry::new();
        let id = registry.create(&spec());
        let json = serde_json::to_value(registry.get(&id).expect("record")).expect("json");
        assert_eq!(json["state"], "running");
        assert_eq!(json["command"], "/bin/echo");
        assert!(json.get("exit_code").is_none());
        assert!(json.get("created_at").is_some());
    }
}
