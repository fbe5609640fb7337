//! NanoVNA web bridge — entry point.
//!
//! Serves the NanoVNA web client's static files over HTTP and bridges its
//! control WebSocket to the analyzer's USB serial port, so the browser can
//! drive the instrument as if it were plugged in locally.
//!
//! # Usage
//!
//! ```text
//! vna-web-bridge [OPTIONS] <VNA> [PORT]
//!
//! Arguments:
//!   <VNA>   NanoVNA serial port (e.g. /dev/ttyACM0, COM3)
//!   [PORT]  bind to this port [default: 8000]
//!
//! Options:
//!   -b, --bind <ADDRESS>       bind to this address [default: 0.0.0.0]
//!   -d, --directory <DIR>      serve this directory [default: current directory]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable        | Default        | Description                  |
//! |-----------------|----------------|------------------------------|
//! | `VNA_DEVICE`    | (required)     | Serial port of the analyzer  |
//! | `VNA_PORT`      | `8000`         | HTTP / WebSocket port        |
//! | `VNA_BIND`      | `0.0.0.0`      | Listen address               |
//! | `VNA_DIRECTORY` | current dir    | Static file root             |
//!
//! # Architecture overview
//!
//! ```text
//! Web Browser  (HTTP + WebSocket text frames, one char per byte)
//!       ↕
//! vna-web-bridge  ← this process
//!   domain/        BridgeConfig, request routing
//!   application/   payload translation, static file lookup
//!   infrastructure/
//!     ws_server/        accept loop + connection gate
//!     control_session/  WebSocket ↔ device pump
//!       ↕
//! vna-core  (Arbiter → DeviceChannel + DeviceReader)
//!       ↕
//! NanoVNA  (USB CDC serial, 115200 baud)
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vna_web_bridge::domain::{BridgeConfig, CONTROL_PATH_TOKEN, DEFAULT_PORT};
use vna_web_bridge::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// NanoVNA web bridge.
///
/// Serves the web client and forwards its control WebSocket to the analyzer.
#[derive(Debug, Parser)]
#[command(
    name = "vna-web-bridge",
    about = "Serves the NanoVNA web client and bridges it to the analyzer's serial port",
    version
)]
struct Cli {
    /// NanoVNA serial port.
    #[arg(env = "VNA_DEVICE")]
    vna: String,

    /// Bind to this port.
    #[arg(default_value_t = DEFAULT_PORT, env = "VNA_PORT")]
    port: u16,

    /// Bind to this address.
    ///
    /// The default accepts connections on every interface; use `127.0.0.1`
    /// to keep the analyzer reachable from this machine only.
    #[arg(short, long, value_name = "ADDRESS", default_value = "0.0.0.0", env = "VNA_BIND")]
    bind: IpAddr,

    /// Serve this directory (default: current directory).
    #[arg(short, long, value_name = "DIR", env = "VNA_DIRECTORY")]
    directory: Option<PathBuf>,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the serve directory cannot be resolved.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let directory = match self.directory {
            Some(dir) => dir,
            None => std::env::current_dir().context("cannot determine current directory")?,
        };
        let serve_dir = directory
            .canonicalize()
            .with_context(|| format!("invalid serve directory: '{}'", directory.display()))?;

        Ok(BridgeConfig {
            bind_addr: SocketAddr::new(self.bind, self.port),
            device_path: self.vna,
            serve_dir,
            control_token: CONTROL_PATH_TOKEN.to_string(),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controls verbosity; `info` shows the HTTP and CONTROL lines.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    info!(
        "NanoVNA web bridge starting — device={}, dir={}",
        config.device_path,
        config.serve_dir.display()
    );

    // The accept loop polls this flag every 200 ms.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("NanoVNA web bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    const ENV_VARS: [(&str, &str); 4] = [
        ("vna", "VNA_DEVICE"),
        ("port", "VNA_PORT"),
        ("bind", "VNA_BIND"),
        ("directory", "VNA_DIRECTORY"),
    ];

    /// Parses `args` with the environment fallbacks switched off, so the
    /// result does not depend on the shell the tests run in.
    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        let mut command = Cli::command();
        for (id, _) in ENV_VARS {
            command = command.mut_arg(id, |arg| arg.env(None::<&'static str>));
        }
        let matches = command.try_get_matches_from(args)?;
        Cli::from_arg_matches(&matches)
    }

    fn parse(args: &[&str]) -> Cli {
        try_parse(args).unwrap()
    }

    #[test]
    fn test_cli_requires_device() {
        assert!(try_parse(&["vna-web-bridge"]).is_err());
    }

    #[test]
    fn test_cli_options_fall_back_to_env_vars() {
        let command = Cli::command();
        for (id, var) in ENV_VARS {
            let arg = command
                .get_arguments()
                .find(|a| a.get_id() == id)
                .unwrap();
            assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new(var)), "{id}");
        }
    }

    #[test]
    fn test_cli_device_is_first_positional() {
        let cli = parse(&["vna-web-bridge", "/dev/ttyACM1"]);
        assert_eq!(cli.vna, "/dev/ttyACM1");
    }

    #[test]
    fn test_cli_default_port() {
        let cli = parse(&["vna-web-bridge", "COM3"]);
        assert_eq!(cli.port, 8000);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = parse(&["vna-web-bridge", "COM3", "9000"]);
        assert_eq!(cli.port, 9000);
    }

    #[test]
    fn test_cli_default_bind_is_all_interfaces() {
        let cli = parse(&["vna-web-bridge", "COM3"]);
        assert!(cli.bind.is_unspecified());
    }

    #[test]
    fn test_cli_bind_short_flag() {
        let cli = parse(&["vna-web-bridge", "-b", "127.0.0.1", "COM3"]);
        assert_eq!(cli.bind.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_cli_bind_accepts_ipv6() {
        let cli = parse(&["vna-web-bridge", "--bind", "::1", "COM3"]);
        assert!(cli.bind.is_ipv6());
    }

    #[test]
    fn test_cli_invalid_bind_is_rejected() {
        let result = try_parse(&["vna-web-bridge", "--bind", "not.an.ip", "COM3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_invalid_port_is_rejected() {
        let result = try_parse(&["vna-web-bridge", "COM3", "99999"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_into_bridge_config_builds_bind_addr() {
        let cli = parse(&["vna-web-bridge", "-b", "127.0.0.1", "COM3", "8080"]);

        let config = cli.into_bridge_config().unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.device_path, "COM3");
        assert_eq!(config.control_token, "nanovna-control");
    }

    #[test]
    fn test_into_bridge_config_canonicalises_directory() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli {
            vna: "COM3".to_string(),
            port: 8000,
            bind: "0.0.0.0".parse().unwrap(),
            directory: Some(dir.path().join(".")),
        };

        // Act
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.serve_dir, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_into_bridge_config_missing_directory_returns_error() {
        let cli = Cli {
            vna: "COM3".to_string(),
            port: 8000,
            bind: "0.0.0.0".parse().unwrap(),
            directory: Some(PathBuf::from("/definitely/not/here")),
        };

        assert!(cli.into_bridge_config().is_err());
    }

    #[test]
    fn test_into_bridge_config_defaults_to_current_directory() {
        let cli = parse(&["vna-web-bridge", "COM3"]);
        let config = cli.into_bridge_config().unwrap();
        assert_eq!(
            config.serve_dir,
            std::env::current_dir().unwrap().canonicalize().unwrap()
        );
    }
}
