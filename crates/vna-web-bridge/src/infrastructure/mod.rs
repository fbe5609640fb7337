//! Infrastructure layer for vna-web-bridge.
//!
//! The infrastructure layer handles all I/O.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and accepting connections
//! - Reading each request head and routing it (the connection gate)
//! - Serving static files
//! - Completing the WebSocket handshake for the control path
//! - Running the Bridge Session between the WebSocket and the device
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Path-safety rules and content types (application layer)
//! - Routing rules (domain layer)
//! - Configuration parsing (done in `main.rs`)

pub mod control_session;
pub mod http;
pub mod ws_server;

pub use control_session::{handle_connection, SessionEnd};
pub use ws_server::{run_server, serve, ServerContext};
