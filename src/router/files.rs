//! Static file serving behind a `/*filepath` route.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::handler::HandlerFuture;
use crate::{Request, Response, StatusCode};

/// Serves files for [`Router::serve_files`](super::Router::serve_files).
///
/// The router rewrites the request path to the captured `filepath` (always
/// starting with `/`) before calling [`serve`](FileServer::serve).
pub trait FileServer: Send + Sync + 'static {
    fn serve(self: Arc<Self>, request: Request) -> HandlerFuture;
}

/// Serves files below a directory on the local filesystem.
///
/// Paths containing `..` are refused, paths ending in `/` serve the
/// directory's `index.html`, and anything unreadable is a 404.
#[derive(Debug, Clone)]
pub struct StaticDir {
    root: PathBuf,
}

impl StaticDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location for a request path, `None` if it escapes the root.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }

        let mut full = self.root.join(relative);
        if path.is_empty() || path.ends_with('/') {
            full.push("index.html");
        }
        Some(full)
    }
}

impl FileServer for StaticDir {
    fn serve(self: Arc<Self>, request: Request) -> HandlerFuture {
        Box::pin(async move {
            let Some(file) = self.resolve(request.path()) else {
                debug!(path = %request.path(), "refusing path outside of the served root");
                return Response::text(StatusCode::NotFound, "404 page not found");
            };

            match read_file(&file).await {
                Ok(contents) => Response::new(StatusCode::Ok)
                    .header("Content-Type", content_type(&file))
                    .body_bytes(contents),
                Err(err) => {
                    debug!(file = %file.display(), error = %err, "static file unavailable");
                    Response::text(StatusCode::NotFound, "404 page not found")
                }
            }
        })
    }
}

async fn read_file(file: &Path) -> io::Result<Vec<u8>> {
    if tokio::fs::metadata(file).await?.is_dir() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "is a directory"));
    }
    tokio::fs::read(file).await
}

fn content_type(file: &Path) -> &'static str {
    match file.extension().and_then(|ext| ext.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
