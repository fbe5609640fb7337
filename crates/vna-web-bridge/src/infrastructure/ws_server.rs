//! HTTP/WebSocket server: accept loop and the connection gate.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Reading each connection's request head and routing it:
//!    - **Upgrade to `…/nanovna-control`**: validate and complete the
//!      WebSocket handshake (`400` if it is not one) and hand the socket to
//!      a Bridge Session.
//!    - **Upgrade to any other path**: answer `404 NOT FOUND`.
//!    - **Plain `GET` / `HEAD`**: serve a file from the serve directory.
//! 4. Gracefully shutting down when the `running` flag is cleared.
//!
//! Each connection runs in its own Tokio task, so a slow static download or
//! a long-lived control session never delays the next `accept()`.  Exclusive
//! device control is the [`Arbiter`]'s job, not the accept loop's: any number
//! of control connections may arrive; the newest one wins.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use vna_core::Arbiter;

use crate::application::{resolve_static_path, StaticError};
use crate::domain::{classify, BridgeConfig, Route};
use crate::infrastructure::control_session::handle_connection;
use crate::infrastructure::http::{
    read_request_head, websocket_accept, HttpError, RequestHead, Response,
};

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Everything a connection task needs, shared behind one `Arc`.
pub struct ServerContext {
    pub config: BridgeConfig,
    pub arbiter: Arc<Arbiter>,
}

impl ServerContext {
    pub fn new(config: BridgeConfig, arbiter: Arc<Arbiter>) -> Self {
        Self { config, arbiter }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves until `running` is set to `false`.
///
/// Control sessions open real serial ports through
/// [`Arbiter::with_serial_ports`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.bind_addr))?;

    let local = listener.local_addr().unwrap_or(config.bind_addr);
    info!("Running server at http://{local}/");

    let arbiter = Arc::new(Arbiter::with_serial_ports());
    let ctx = Arc::new(ServerContext::new(config, arbiter));
    serve(listener, ctx, running).await
}

/// Runs the accept loop on an already-bound `listener`.
///
/// Split from [`run_server`] so tests can bind an ephemeral port and supply
/// their own arbiter.
///
/// # Errors
///
/// Currently never fails; accept errors are logged and the loop continues.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop notices the flag even when idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("new connection from {peer}");
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    if let Err(e) = dispatch_connection(stream, peer, ctx).await {
                        warn!("connection {peer} closed with error: {e:#}");
                    }
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Connection gate ───────────────────────────────────────────────────────────

async fn dispatch_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
) -> anyhow::Result<()> {
    let mut reader = BufReader::new(stream);

    let head = match read_request_head(&mut reader).await {
        Ok(head) => head,
        Err(HttpError::Incomplete) => {
            debug!("{peer}: closed before sending a request");
            return Ok(());
        }
        Err(e) => {
            debug!("{peer}: {e}");
            Response::bad_request()
                .write_to(reader.get_mut(), true)
                .await?;
            let _ = reader.get_mut().shutdown().await;
            return Ok(());
        }
    };

    match classify(&head.target, head.is_upgrade(), &ctx.config.control_token) {
        Route::Control => upgrade_control(reader, peer, &head, &ctx).await,
        Route::Rejected => {
            info!("HTTP {} {} 404 NOT FOUND (upgrade)", head.method, head.target);
            Response::not_found()
                .write_to(reader.get_mut(), true)
                .await?;
            let _ = reader.get_mut().shutdown().await;
            Ok(())
        }
        Route::Static { path } => {
            let response = static_response(&head, &path, &ctx.config.serve_dir).await;
            info!(
                "HTTP {} {} {} {}",
                head.method,
                path,
                response.status,
                response.reason.to_ascii_uppercase()
            );
            response
                .write_to(reader.get_mut(), head.wants_body())
                .await
                .with_context(|| format!("{peer}: writing response for {path}"))?;
            let _ = reader.get_mut().shutdown().await;
            Ok(())
        }
    }
}

/// Completes the WebSocket handshake and runs a Bridge Session.
///
/// A request that fails handshake validation gets `400` and never reaches
/// the arbiter, so it cannot evict the current controller.
///
/// The `BufReader` is kept as the transport so that any frame bytes the
/// browser sent right behind its request head are not lost.
async fn upgrade_control(
    mut reader: BufReader<TcpStream>,
    peer: SocketAddr,
    head: &RequestHead,
    ctx: &ServerContext,
) -> anyhow::Result<()> {
    let reply = match websocket_accept(head) {
        Ok(reply) => reply,
        Err(e) => {
            info!("HTTP {} {} 400 BAD REQUEST ({e})", head.method, head.target);
            Response::bad_request()
                .write_to(reader.get_mut(), true)
                .await?;
            let _ = reader.get_mut().shutdown().await;
            return Ok(());
        }
    };

    reply
        .write_to(reader.get_mut(), false)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer}"))?;

    let ws = WebSocketStream::from_raw_socket(reader, Role::Server, None).await;
    let end = handle_connection(
        ws,
        peer,
        Arc::clone(&ctx.arbiter),
        &ctx.config.device_path,
    )
    .await?;
    debug!("{peer}: control session ended: {end:?}");
    Ok(())
}

/// Builds the response for a plain request to `path`.
async fn static_response(head: &RequestHead, path: &str, serve_dir: &Path) -> Response {
    if head.method != "GET" && head.method != "HEAD" {
        return Response::not_found();
    }

    let file = match resolve_static_path(serve_dir, path) {
        Ok(file) => file,
        Err(StaticError::Root { path, source }) => {
            warn!("serve directory {} is unusable: {source}", path.display());
            return Response::not_found();
        }
        Err(e) => {
            debug!("{e}");
            return Response::not_found();
        }
    };

    match tokio::fs::read(&file.path).await {
        Ok(body) => Response::file(file.content_type, body),
        Err(e) => {
            warn!("failed to read {}: {e}", file.path.display());
            Response::not_found()
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn head(method: &str) -> RequestHead {
        RequestHead {
            method: method.to_string(),
            version: 1,
            target: "/index.html".to_string(),
            headers: Vec::new(),
        }
    }

    fn www() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<html>hi</html>").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_get_existing_file_is_200() {
        let dir = www();

        let response = static_response(&head("GET"), "/index.html", dir.path()).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"<html>hi</html>");
    }

    #[tokio::test]
    async fn test_head_is_served_like_get() {
        let dir = www();
        let response = static_response(&head("HEAD"), "/index.html", dir.path()).await;
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_post_is_404() {
        let dir = www();
        let response = static_response(&head("POST"), "/index.html", dir.path()).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_missing_file_is_404() {
        let dir = www();
        let response = static_response(&head("GET"), "/missing.js", dir.path()).await;
        assert_eq!(response.status, 404);
        assert_eq!(response.body, b"404 NOT FOUND");
    }

    #[tokio::test]
    async fn test_missing_serve_dir_is_404() {
        let response =
            static_response(&head("GET"), "/index.html", Path::new("/no/such/dir")).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_serve_stops_when_flag_cleared() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let opener = Arc::new(vna_core::device::mock::MockOpener::new());
        let ctx = Arc::new(ServerContext::new(
            BridgeConfig::default(),
            Arc::new(Arbiter::new(opener)),
        ));
        let running = Arc::new(AtomicBool::new(true));
        let server = tokio::spawn(serve(listener, ctx, Arc::clone(&running)));

        // Act
        running.store(false, Ordering::Relaxed);

        // Assert: exits within a couple of poll intervals
        let result = timeout(Duration::from_secs(2), server).await;
        assert!(result.is_ok(), "accept loop must notice the flag");
    }
}
