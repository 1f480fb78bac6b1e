//! Request handlers and the router wiring them up.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use cfs_common::error::{CfsError, Result};
use cfs_common::types::{ContainerId, ContainerSpec, CpuMax, ResourceLimits, parse_bytes};
use cfs_runtime::Launcher;
use cfs_runtime::launcher::validate_spec;

use crate::error::ApiError;
use crate::registry::{ContainerRecord, ContainerRegistry};

const BANNER: &str = "cfs container runtime\n\n\
GET    /run       list containers\n\
POST   /run       run a container: {\"image\", \"command\", \"args\", \"memory\", \"pids\", \"cpu_max\"}\n\
DELETE /run/{id}  forget a container\n";

/// Runs a container to completion. Blocking.
pub trait Runner: Send + Sync {
    /// Runs `spec` and returns the command's exit code.
    ///
    /// # Errors
    ///
    /// Returns the runtime's error if the container could not run to a
    /// normal exit.
    fn run(&self, spec: &ContainerSpec) -> Result<i32>;
}

impl Runner for Launcher {
    fn run(&self, spec: &ContainerSpec) -> Result<i32> {
        Self::run(self, spec)
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    registry: ContainerRegistry,
    runner: Arc<dyn Runner>,
    defaults: ResourceLimits,
}

impl AppState {
    /// Serves containers through `runner`, filling unset limits from
    /// `defaults`.
    pub fn new(runner: Arc<dyn Runner>, defaults: ResourceLimits) -> Self {
        Self {
            registry: ContainerRegistry::new(),
            runner,
            defaults,
        }
    }

    /// The registry behind `GET /run`.
    #[must_use]
    pub const fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// Host path of the image root.
    pub image: PathBuf,
    /// Command to run inside the image.
    pub command: String,
    /// Arguments of the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Memory ceiling such as `"256MiB"` or a plain byte count.
    pub memory: Option<String>,
    /// Process-count ceiling.
    pub pids: Option<u64>,
    /// CPU bandwidth as `QUOTA:PERIOD` in microseconds.
    pub cpu_max: Option<String>,
}

impl RunRequest {
    /// Turns the request into a spec, overriding `defaults` field by field.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidSpec`] for unparsable limits or an empty
    /// command or image.
    pub fn into_spec(self, defaults: &ResourceLimits) -> std::result::Result<ContainerSpec, ApiError> {
        let mut limits = defaults.clone();
        if let Some(memory) = self.memory.as_deref() {
            limits.max_memory_bytes = Some(parse_bytes(memory).ok_or_else(|| {
                ApiError::InvalidSpec(format!("invalid container spec: bad memory limit {memory:?}"))
            })?);
        }
        if let Some(pids) = self.pids {
            limits.max_pids = Some(pids);
        }
        if let Some(cpu) = self.cpu_max.as_deref() {
            limits.cpu_max = Some(cpu.parse::<CpuMax>()?);
        }
        Ok(ContainerSpec::builder(self.image, self.command)
            .args(self.args)
            .limits(limits)
            .build()?)
    }
}

/// Builds the façade's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/run", get(list_containers).post(run_container))
        .route("/run/{id}", delete(remove_container))
        .with_state(state)
}

/// `GET /`
pub async fn index() -> &'static str {
    BANNER
}

/// `GET /run`
pub async fn list_containers(State(state): State<AppState>) -> Json<Vec<ContainerRecord>> {
    Json(state.registry.list())
}

/// `POST /run`: runs the container to completion, then returns every
/// record.
///
/// # Errors
///
/// 400 for a malformed body, 422 for a spec the runtime rejects before
/// launching, 500 if the run could not be awaited.
pub async fn run_container(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RunRequest>, JsonRejection>,
) -> std::result::Result<Json<Vec<ContainerRecord>>, ApiError> {
    let Json(request) = payload?;
    let spec = request.into_spec(&state.defaults)?;
    let _ = validate_spec(&spec)?;

    let id = state.registry.create(&spec);
    tracing::info!(id = %id, image = %spec.image_path().display(), command = %spec.command(), "running container");

    let runner = Arc::clone(&state.runner);
    let outcome = tokio::task::spawn_blocking(move || runner.run(&spec))
        .await
        .map_err(|e| ApiError::Internal(format!("container task failed: {e}")));
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            let _ = record_outcome(
                &state.registry,
                &id,
                &Err(CfsError::Syscall {
                    operation: "run",
                    message: e.to_string(),
                }),
            );
            return Err(e);
        }
    };
    if let Err(e) = &outcome {
        tracing::warn!(id = %id, error = %e, "container failed");
    }
    let _ = record_outcome(&state.registry, &id, &outcome);
    Ok(Json(state.registry.list()))
}

/// Stores how run `id` ended. Returns `false` when the record was deleted
/// while the container was running.
fn record_outcome(registry: &ContainerRegistry, id: &ContainerId, outcome: &Result<i32>) -> bool {
    let recorded = registry.finish(id, outcome);
    if !recorded {
        tracing::debug!(id = %id, "record removed before the container finished");
    }
    recorded
}

/// `DELETE /run/{id}`
///
/// # Errors
///
/// 404 when no record has `id`.
pub async fn remove_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    let id = ContainerId::new(id);
    state
        .registry
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}
