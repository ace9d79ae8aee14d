//! HTTP and WebSocket gateway over a running [`workforce_orchestrator::Orchestrator`].
//!
//! REST routes create and steer goals, fetch deliverables, and accept
//! reviewer decisions; `/ws` streams the workspace event feed with replay.

/// Active WebSocket connections.
pub mod connection;
/// Mapping of engine errors to HTTP responses.
pub mod error;
/// API-key authentication.
pub mod middleware;
/// REST handlers.
pub mod routes;
/// Router assembly and the WebSocket event stream.
pub mod server;

pub use error::ApiError;
pub use middleware::AuthConfig;
pub use server::{AppState, GatewayServer};
