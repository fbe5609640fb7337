//! Application layer for vna-web-bridge.
//!
//! The application layer knows *what* to do with a request; the
//! infrastructure layer knows *how* to move the bytes.
//!
//! # Responsibilities
//!
//! - Translating browser text payloads to device bytes and back
//! - Resolving static request paths safely under the serve root
//! - Guessing content types for static responses
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections
//! - Tokio task spawning
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod bridge_service;
pub mod static_files;

pub use bridge_service::{translate_browser_to_device, translate_device_to_browser, BridgeError};
pub use static_files::{guess_content_type, resolve_static_path, ContentType, StaticError, StaticFile};
