//! vna-web-bridge library crate.
//!
//! This crate serves the NanoVNA browser front end and exposes the analyzer's
//! serial port to one browser at a time over a WebSocket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (HTTP GET for assets, WebSocket text frames for control)
//!         ↕
//! [vna-web-bridge]
//!   ├── domain/           Pure types: BridgeConfig, connection routing
//!   ├── application/      Static path resolution, content types,
//!   │                     browser text ↔ device bytes translation
//!   └── infrastructure/
//!         ├── http/            Request head parsing, response writing
//!         ├── ws_server/       Accept loop and connection gate
//!         └── control_session/ Bridge Session (WebSocket ↔ serial)
//!         ↕
//! [vna-core]  Arbiter → DeviceChannel + DeviceReader → serial port
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `vna-core`'s codec only; its one
//!   filesystem touch is resolving a request path under the serve root.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tungstenite`, and `httparse`.

/// Domain layer: configuration and routing decisions (no I/O).
pub mod domain;

/// Application layer: static file lookup and payload translation.
pub mod application;

/// Infrastructure layer: HTTP, WebSocket server, and the Bridge Session.
pub mod infrastructure;
