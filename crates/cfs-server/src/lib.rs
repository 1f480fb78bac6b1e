//! # cfs-server
//!
//! HTTP/JSON façade over the container runtime. Each `POST /run` runs one
//! container to completion on a blocking worker and records the outcome in
//! an in-memory [`registry::ContainerRegistry`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod error;
pub mod registry;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use cfs_runtime::Launcher;

use crate::error::ServerError;
use crate::routes::AppState;

/// Serves the façade on `addr` until the process is stopped.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if `addr` cannot be bound, or
/// [`ServerError::Serve`] if the server stops with an I/O error.
pub async fn serve(addr: SocketAddr, launcher: Launcher) -> Result<(), ServerError> {
    let defaults = launcher.config().default_limits.clone();
    let state = AppState::new(Arc::new(launcher), defaults);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(addr = %addr, "HTTP façade listening");
    axum::serve(listener, routes::router(state)).await?;
    Ok(())
}
