//! Domain layer for vna-web-bridge.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or external frameworks.
//!
//! # What belongs in the domain layer?
//!
//! - Configuration structures
//! - The connection gate's routing decision
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod route;

pub use config::{BridgeConfig, CONTROL_PATH_TOKEN, DEFAULT_PORT};
pub use route::{classify, Route};
