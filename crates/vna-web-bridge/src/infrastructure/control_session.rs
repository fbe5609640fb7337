//! The Bridge Session: one browser WebSocket ↔ the analyzer's serial port.
//!
//! # Lifecycle
//!
//! ```text
//! Starting ──acquire ok──► Active ──client closed / device ended / superseded / error──► Closing ──► Closed
//!    │                                                                                     ▲
//!    └──acquire failed (close 1011 "device unavailable")───────────────────────────────────┘ (nothing to release)
//! ```
//!
//! - **Starting**: [`Arbiter::acquire`] runs on a blocking thread (it may
//!   wait for a previous session's reader to stop and its port to close).
//!   The session's [`DeviceSink`](vna_core::DeviceSink) is the sending half
//!   of an unbounded channel whose receiver this task owns.
//! - **Active**: a single `select!` loop waits for whichever comes first:
//!   the next WebSocket frame (decoded and written to the device) or the next
//!   device event (encoded and sent to the browser).  One loop per session
//!   keeps each direction in order.
//! - **Closing**: the [`ControlGuard`] is released exactly once, on a
//!   blocking thread, on every exit path out of Active.  If the task itself
//!   is cancelled the guard's `Drop` performs the same release.
//!
//! A superseded session notices either its device event channel closing (the
//! arbiter joined its reader) or a write failing with `DeviceClosed`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};
use uuid::Uuid;

use vna_core::{Arbiter, ControlGuard, DeviceChannel, DeviceEnd, DeviceError, DeviceEvent};

use crate::application::{translate_browser_to_device, translate_device_to_browser};

/// Why an Active session ended without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The browser closed the WebSocket (or the TCP connection dropped).
    ClientClosed,
    /// The device reported end-of-stream or a read failure.
    DeviceEnded(DeviceEnd),
    /// A newer session took control of the device.
    Superseded,
}

/// Runs a Bridge Session on an already-upgraded WebSocket.
///
/// This is the entry point the connection gate uses once it has classified a
/// request as the control path.  Returns how the session ended.
///
/// # Errors
///
/// Returns an error if the device could not be acquired, a device write
/// failed, or the browser sent a payload that is not byte-per-character text.
/// In every case the WebSocket is closed and control (if acquired) released
/// before returning.
pub async fn handle_connection<S>(
    ws: S,
    peer: SocketAddr,
    arbiter: Arc<Arbiter>,
    device_path: &str,
) -> anyhow::Result<SessionEnd>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
{
    let session_id = Uuid::new_v4().simple().to_string();
    let session = &session_id[..8];

    info!("CONTROL OPEN {peer} (session {session})");
    let result = run_session(ws, session, arbiter, device_path).await;
    info!("CONTROL CLOSE {peer} (session {session})");

    result
}

async fn run_session<S>(
    mut ws: S,
    session: &str,
    arbiter: Arc<Arbiter>,
    device_path: &str,
) -> anyhow::Result<SessionEnd>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
{
    // ── Starting ──────────────────────────────────────────────────────────────
    let (sink, mut events) = mpsc::unbounded_channel();
    let acquired = {
        let arbiter = Arc::clone(&arbiter);
        let port = device_path.to_string();
        tokio::task::spawn_blocking(move || arbiter.acquire(&port, sink))
            .await
            .context("device acquisition task failed")?
    };

    let guard = match acquired {
        Ok(guard) => guard,
        Err(e) => {
            warn!("session {session}: cannot acquire {device_path}: {e}");
            close_with(&mut ws, CloseCode::Error, "device unavailable").await;
            return Err(e).with_context(|| format!("session {session}: acquiring {device_path}"));
        }
    };
    debug!(
        "session {session}: controls {device_path} (generation {})",
        guard.handle().generation()
    );

    // ── Active ────────────────────────────────────────────────────────────────
    let outcome = pump(&mut ws, &mut events, &guard, session).await;

    // ── Closing ───────────────────────────────────────────────────────────────
    release(guard, session).await;

    match &outcome {
        Ok(SessionEnd::ClientClosed) => {
            let _ = ws.close().await;
        }
        Ok(SessionEnd::Superseded) => {
            close_with(&mut ws, CloseCode::Normal, "superseded").await;
        }
        Ok(SessionEnd::DeviceEnded(end)) => {
            debug!("session {session}: device ended: {end:?}");
            close_with(&mut ws, CloseCode::Error, "device disconnected").await;
        }
        Err(e) => {
            warn!("session {session}: {e:#}");
            close_with(&mut ws, CloseCode::Error, "device error").await;
        }
    }

    debug!("session {session}: arbiter stats {:?}", arbiter.stats());
    outcome
}

/// The Active state's loop.
async fn pump<S>(
    ws: &mut S,
    events: &mut mpsc::UnboundedReceiver<DeviceEvent>,
    guard: &ControlGuard,
    session: &str,
) -> anyhow::Result<SessionEnd>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            frame = ws.next() => {
                let payload = match frame {
                    Some(Ok(WsMessage::Text(text))) => translate_browser_to_device(&text)
                        .with_context(|| format!("session {session}: bad payload from browser"))?,
                    // Raw bytes need no translation.
                    Some(Ok(WsMessage::Binary(bytes))) => bytes,
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!("session {session}: browser sent Close");
                        return Ok(SessionEnd::ClientClosed);
                    }
                    // Ping replies are queued by tungstenite and flushed on the next send.
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Protocol(_))) | None => {
                        debug!("session {session}: browser connection ended");
                        return Ok(SessionEnd::ClientClosed);
                    }
                    Some(Err(e)) => {
                        return Err(e).with_context(|| format!("session {session}: WebSocket receive failed"));
                    }
                };

                match write_to_device(guard.channel(), payload).await {
                    Ok(()) => {}
                    Err(DeviceError::Closed) if !guard.is_current() => {
                        debug!("session {session}: device channel closed under us");
                        return Ok(SessionEnd::Superseded);
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("session {session}: device write failed"));
                    }
                }
            }

            event = events.recv() => match event {
                Some(DeviceEvent::Data(bytes)) => {
                    let text = translate_device_to_browser(&bytes);
                    if let Err(e) = ws.send(WsMessage::Text(text)).await {
                        debug!("session {session}: WebSocket send failed (browser disconnected): {e}");
                        return Ok(SessionEnd::ClientClosed);
                    }
                }
                Some(DeviceEvent::Ended(end)) => return Ok(SessionEnd::DeviceEnded(end)),
                // The reader was stopped and its sink dropped by a newer acquire.
                None => return Ok(SessionEnd::Superseded),
            },
        }
    }
}

/// Writes on a blocking thread; awaiting each write keeps messages in order.
async fn write_to_device(channel: &Arc<DeviceChannel>, bytes: Vec<u8>) -> Result<(), DeviceError> {
    let channel = Arc::clone(channel);
    match tokio::task::spawn_blocking(move || channel.write(&bytes)).await {
        Ok(result) => result,
        Err(join_error) => Err(DeviceError::Io(io::Error::other(join_error.to_string()))),
    }
}

/// Releases control off the async thread (it joins the reader).
async fn release(guard: ControlGuard, session: &str) {
    match tokio::task::spawn_blocking(move || guard.release()).await {
        Ok(true) => debug!("session {session}: released device"),
        Ok(false) => debug!("session {session}: already superseded; nothing to release"),
        Err(e) => warn!("session {session}: release task failed: {e}"),
    }
}

/// Sends a Close frame and closes the sink, ignoring errors (the peer may
/// already be gone).
async fn close_with<S>(ws: &mut S, code: CloseCode, reason: &'static str)
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = ws.send(WsMessage::Close(Some(frame))).await;
    let _ = ws.close().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
