//! Viewer API server for the room occupancy monitor.
//!
//! This crate provides an Axum HTTP server with two adapters over the
//! same ingestion state:
//!
//! - **Pull**: `GET /latest` for the raw latest payload, plus JSON
//!   endpoints for stored history, the last recorded reading and
//!   three-hour block averages
//! - **Push**: `GET /ws`, one [`ViewerSession`] per `WebSocket`
//!   connection fed by the shared [`Broadcaster`]
//! - **Status page**: `GET /` with the current reading and API links
//!
//! The observer only reads state. Sensor ingestion lives in the service
//! binary, which shares its [`StateStore`] and [`Broadcaster`] handles
//! through [`AppState`].
//!
//! [`ViewerSession`]: occupancy_core::ViewerSession
//! [`Broadcaster`]: occupancy_core::Broadcaster
//! [`StateStore`]: occupancy_core::StateStore

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, serve};
pub use startup::{StartupError, spawn_observer};
pub use state::AppState;
