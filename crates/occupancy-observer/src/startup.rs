//! Viewer server startup helper for embedding in the service binary.
//!
//! Provides [`spawn_observer`] which binds the listening socket and then
//! serves the viewer API on a background Tokio task, so the binary can
//! run it alongside sensor ingestion.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the viewer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind the viewer server and serve it on a background Tokio task.
///
/// The socket is bound before the task is spawned, so a port conflict
/// surfaces here instead of in a log line from the background task. The
/// caller should hold the returned handle and abort or await it during
/// shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address is invalid or cannot
/// be bound.
pub async fn spawn_observer(
    config: &ServerConfig,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    let handle = tokio::spawn(async move {
        if let Err(e) = crate::server::serve(listener, state).await {
            tracing::error!(error = %e, "Viewer server exited with error");
        }
    });

    tracing::info!(%addr, "Viewer server spawned on background task");

    Ok(handle)
}
