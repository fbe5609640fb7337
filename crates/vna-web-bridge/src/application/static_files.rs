//! Static asset lookup for the web front end.
//!
//! # Path safety
//!
//! A request path is joined onto the serve root and then canonicalised
//! (symlinks and `..` resolved).  The result must still lie under the
//! canonical root and must be an existing regular file; anything else is
//! reported as not found.  Only the canonical path is ever opened.
//!
//! ```text
//! root = /srv/www
//! /index.html        → /srv/www/index.html           ok
//! /../../etc/passwd  → /etc/passwd                    Traversal (404)
//! /js                → /srv/www/js (a directory)      NotFound  (404)
//! ```

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Reasons a static request cannot be served.  All map to 404.
#[derive(Debug, Error)]
pub enum StaticError {
    /// Nothing servable exists at the requested path.
    #[error("no regular file for {0}")]
    NotFound(String),

    /// The path resolved outside the serve root.
    #[error("{0} resolves outside the serve root")]
    Traversal(String),

    /// The serve root itself could not be resolved.
    #[error("serve root {path} is unusable: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Content type (and optional content encoding) for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentType {
    pub mime: &'static str,
    pub encoding: Option<&'static str>,
}

/// A resolved, servable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFile {
    /// Canonical path under the serve root.
    pub path: PathBuf,
    pub content_type: ContentType,
}

/// Generic fallback when the extension is unknown.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Resolves `request_path` (already query-stripped, `/` already mapped to
/// `/index.html`) to a file under `root`.
///
/// # Errors
///
/// - [`StaticError::Root`] if `root` cannot be canonicalised.
/// - [`StaticError::NotFound`] if the target does not exist or is not a
///   regular file.
/// - [`StaticError::Traversal`] if the target lies outside `root`.
pub fn resolve_static_path(root: &Path, request_path: &str) -> Result<StaticFile, StaticError> {
    let root = root.canonicalize().map_err(|source| StaticError::Root {
        path: root.to_path_buf(),
        source,
    })?;

    // Leading slashes would make the join absolute and discard the root.
    let relative = request_path.trim_start_matches('/');
    let candidate = root
        .join(relative)
        .canonicalize()
        .map_err(|_| StaticError::NotFound(request_path.to_string()))?;

    if !candidate.starts_with(&root) {
        return Err(StaticError::Traversal(request_path.to_string()));
    }
    if !candidate.is_file() {
        return Err(StaticError::NotFound(request_path.to_string()));
    }

    Ok(StaticFile {
        path: candidate,
        content_type: guess_content_type(request_path),
    })
}

/// Guesses a content type from the file name in `path`.
///
/// A trailing compression suffix (`.gz`, `.br`, `.bz2`, `.xz`) is reported as
/// the content encoding and the type is guessed from the name without it:
/// `app.js.gz` is `text/javascript` encoded with `gzip`.
pub fn guess_content_type(path: &str) -> ContentType {
    let name = path.rsplit('/').next().unwrap_or(path);

    let (name, encoding) = match name.rsplit_once('.') {
        Some((stem, ext)) => match encoding_for(ext) {
            Some(encoding) => (stem, Some(encoding)),
            None => (name, None),
        },
        None => (name, None),
    };

    let mime = name
        .rsplit_once('.')
        .and_then(|(_, ext)| mime_for(ext))
        .unwrap_or(OCTET_STREAM);

    ContentType { mime, encoding }
}

fn encoding_for(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "gz" => Some("gzip"),
        "br" => Some("br"),
        "bz2" => Some("bzip2"),
        "xz" => Some("xz"),
        _ => None,
    }
}

fn mime_for(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "wasm" => "application/wasm",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "text/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/vnd.microsoft.icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        // Touchstone files produced by the front end's export.
        "s1p" | "s2p" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
