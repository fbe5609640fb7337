//! Minimal HTTP/1.1 handling for the connection gate.
//!
//! The bridge only ever needs to read one request head per connection and
//! write one response, so rather than a full HTTP server this module offers:
//!
//! - [`read_request_head`] – read up to the blank line and parse it with
//!   `httparse`, never consuming a byte past the head.
//! - [`websocket_accept`] – hand an upgrade request to tungstenite's server
//!   handshake check and build the `101` reply, or refuse it.
//! - [`Response`] – a tiny response builder with the handful of responses
//!   the bridge sends (file, 404, 400, 101).
//!
//! Connections are closed after every non-upgrade response.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::server::create_response;
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_ACCEPT, Request, Version};

use crate::application::ContentType;

/// Upper bound on the size of a request head.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Maximum number of headers accepted in one request.
const MAX_HEADERS: usize = 64;

/// `Server` header value.
pub const SERVER_NAME: &str = "NanoVNA Web Client Websocket Server";

/// Errors while reading a request head.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer closed the connection before finishing the head.
    #[error("connection closed before the request head was complete")]
    Incomplete,

    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    TooLarge,

    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("I/O error reading request: {0}")]
    Io(#[from] io::Error),
}

/// Why an upgrade request was not accepted as a WebSocket handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("request cannot be represented: {0}")]
    Request(#[from] tokio_tungstenite::tungstenite::http::Error),

    #[error("{0}")]
    Refused(#[from] tokio_tungstenite::tungstenite::Error),

    /// `Sec-WebSocket-Key` is not 16 base64-encoded bytes.
    #[error("malformed Sec-WebSocket-Key {0:?}")]
    BadKey(String),
}

/// A parsed request line plus headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Minor HTTP version: `1` for HTTP/1.1, `0` for HTTP/1.0.
    pub version: u8,
    /// The request target exactly as sent (path plus optional query).
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Case-insensitive header lookup; returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` if the request carries an `Upgrade` header.
    pub fn is_upgrade(&self) -> bool {
        self.header("upgrade").is_some()
    }

    pub fn websocket_key(&self) -> Option<&str> {
        self.header("sec-websocket-key")
    }

    /// `HEAD` responses carry headers but no body.
    pub fn wants_body(&self) -> bool {
        self.method != "HEAD"
    }
}

/// Reads and parses one request head from `reader`.
///
/// Reads line by line, so when `reader` is a `BufReader` any bytes after the
/// blank line stay buffered for whoever reads next (the WebSocket layer).
///
/// # Errors
///
/// See [`HttpError`].
pub async fn read_request_head<R>(reader: &mut R) -> Result<RequestHead, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut limited = reader.take(MAX_HEAD_BYTES as u64);

    loop {
        let n = limited.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(if buf.len() >= MAX_HEAD_BYTES {
                HttpError::TooLarge
            } else {
                HttpError::Incomplete
            });
        }
        if buf.ends_with(b"\r\n\r\n") || buf.ends_with(b"\n\n") {
            break;
        }
    }

    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    match request.parse(&buf)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(HttpError::Incomplete),
    }

    Ok(RequestHead {
        method: request.method.unwrap_or_default().to_string(),
        version: request.version.unwrap_or_default(),
        target: request.path.unwrap_or_default().to_string(),
        headers: request
            .headers
            .iter()
            .map(|h| {
                (
                    h.name.to_string(),
                    String::from_utf8_lossy(h.value).into_owned(),
                )
            })
            .collect(),
    })
}

/// Validates `head` as a WebSocket opening handshake and builds the `101`
/// reply.
///
/// The method, HTTP version, `Connection`, `Upgrade` and
/// `Sec-WebSocket-Version` checks are tungstenite's own; the key must also
/// decode to 16 bytes.
///
/// # Errors
///
/// Returns [`HandshakeError`] for anything that is not a well-formed
/// handshake.  The caller must answer `400` and not start a session.
pub fn websocket_accept(head: &RequestHead) -> Result<Response, HandshakeError> {
    let version = if head.version >= 1 {
        Version::HTTP_11
    } else {
        Version::HTTP_10
    };
    let mut builder = Request::builder()
        .method(head.method.as_str())
        .uri(head.target.as_str())
        .version(version);
    for (name, value) in &head.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let request = builder.body(())?;

    let reply = create_response(&request)?;

    let key = head.websocket_key().unwrap_or_default().trim();
    if !is_websocket_key(key) {
        return Err(HandshakeError::BadKey(key.to_string()));
    }

    let accept = reply
        .headers()
        .get(SEC_WEBSOCKET_ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Ok(Response::switching_protocols(accept))
}

/// `true` if `key` is base64 for exactly 16 bytes (24 chars, `==` padded).
fn is_websocket_key(key: &str) -> bool {
    let Some(body) = key.strip_suffix("==") else {
        return false;
    };
    body.len() == 22
        && body
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// An HTTP/1.1 response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// `200 OK` carrying a static file.
    pub fn file(content_type: ContentType, body: Vec<u8>) -> Self {
        let mut headers = vec![
            ("Server", SERVER_NAME.to_string()),
            ("Connection", "close".to_string()),
            ("Content-Type", content_type.mime.to_string()),
        ];
        if let Some(encoding) = content_type.encoding {
            headers.push(("Content-Encoding", encoding.to_string()));
        }
        Self::with_length(200, "OK", headers, body)
    }

    /// `404 Not Found` with the short plain-text body the web client expects.
    pub fn not_found() -> Self {
        Self::plain(404, "Not Found", b"404 NOT FOUND")
    }

    pub fn bad_request() -> Self {
        Self::plain(400, "Bad Request", b"400 BAD REQUEST")
    }

    /// `101 Switching Protocols` carrying the derived `accept` value.
    fn switching_protocols(accept: &str) -> Self {
        Self {
            status: 101,
            reason: "Switching Protocols",
            headers: vec![
                ("Server", SERVER_NAME.to_string()),
                ("Upgrade", "websocket".to_string()),
                ("Connection", "Upgrade".to_string()),
                ("Sec-WebSocket-Accept", accept.to_string()),
            ],
            body: Vec::new(),
        }
    }

    fn plain(status: u16, reason: &'static str, body: &[u8]) -> Self {
        let headers = vec![
            ("Server", SERVER_NAME.to_string()),
            ("Connection", "close".to_string()),
            ("Content-Type", "text/plain".to_string()),
        ];
        Self::with_length(status, reason, headers, body.to_vec())
    }

    fn with_length(
        status: u16,
        reason: &'static str,
        mut headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    ) -> Self {
        headers.push(("Content-Length", body.len().to_string()));
        Self {
            status,
            reason,
            headers,
            body,
        }
    }

    /// Serialises the status line, headers, and (optionally) the body.
    pub fn to_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if include_body {
            out.extend_from_slice(&self.body);
        }
        out
    }

    /// Writes the response and flushes.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the peer has gone away.
    pub async fn write_to<W>(&self, writer: &mut W, include_body: bool) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes(include_body)).await?;
        writer.flush().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
