//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from CLI arguments; tests build it directly.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the bridge easy to embed in tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Final path segment that marks a WebSocket upgrade as the control channel.
///
/// The web client connects to `ws://host:port/<anything>/nanovna-control`.
pub const CONTROL_PATH_TOKEN: &str = "nanovna-control";

/// Default HTTP / WebSocket listening port.
pub const DEFAULT_PORT: u16 = 8000;

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use vna_web_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8000);
/// assert_eq!(cfg.control_token, "nanovna-control");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address and port the HTTP/WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Serial port of the analyzer (e.g. `/dev/ttyACM0`, `COM3`).
    pub device_path: String,

    /// Root directory for static assets.  Requests never resolve outside it.
    pub serve_dir: PathBuf,

    /// Final path segment identifying the control WebSocket.
    pub control_token: String,
}

impl Default for BridgeConfig {
    /// | Field          | Default          |
    /// |----------------|------------------|
    /// | bind_addr      | `0.0.0.0:8000`   |
    /// | device_path    | `/dev/ttyACM0`   |
    /// | serve_dir      | `.`              |
    /// | control_token  | `nanovna-control`|
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            device_path: "/dev/ttyACM0".to_string(),
            serve_dir: PathBuf::from("."),
            control_token: CONTROL_PATH_TOKEN.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_8000() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.bind_addr.port(), 8000);
    }

    #[test]
    fn test_default_binds_all_interfaces() {
        let cfg = BridgeConfig::default();
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_serves_current_directory() {
        assert_eq!(BridgeConfig::default().serve_dir, PathBuf::from("."));
    }

    #[test]
    fn test_default_control_token() {
        assert_eq!(BridgeConfig::default().control_token, "nanovna-control");
    }

    #[test]
    fn test_config_custom_values() {
        let cfg = BridgeConfig {
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
            device_path: "COM3".to_string(),
            serve_dir: PathBuf::from("/srv/www"),
            control_token: "vna".to_string(),
        };
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.device_path, "COM3");
        assert_eq!(cfg.clone(), cfg);
    }
}
