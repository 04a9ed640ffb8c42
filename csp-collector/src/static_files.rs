//! Serving rendered pages and assets from the data directory

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Resolve a request path below `/static/` to a file in `dir`
///
/// Only single, non-hidden path segments are served; nested paths, dotfiles
/// (including in-flight temp files) and traversal attempts resolve to `None`.
pub fn resolve(dir: &Path, rest: &str) -> Option<PathBuf> {
    let name = if rest.is_empty() { "index.html" } else { rest };

    let valid = !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('%');

    valid.then(|| dir.join(name))
}

/// Content type for a served file, chosen by extension
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("svg") => "image/svg+xml",
        Some("webmanifest") => "application/manifest+json",
        _ => "application/octet-stream",
    }
}

/// Read a resolved file; a missing file is `None`
pub async fn read(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
