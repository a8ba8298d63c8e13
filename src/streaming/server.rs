//! Local content server
//!
//! Makes a file on this machine reachable by the device over HTTP for the
//! duration of one playback.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeFile;

use crate::error::AirPlayError;

/// HTTP server exposing one local file
#[async_trait]
pub trait ContentServer: Send {
    /// Start serving and return the URL the device should fetch
    ///
    /// # Errors
    ///
    /// Returns `LocalServer` if the listener cannot be bound
    async fn start(&mut self) -> Result<String, AirPlayError>;

    /// Stop serving
    ///
    /// Safe to call when never started or already stopped.
    async fn stop(&mut self);
}

/// Creates a [`ContentServer`] per playback
pub trait ContentServerFactory: Send + Sync {
    /// Server for `path`, listening on `bind`
    fn create(&self, path: &Path, bind: IpAddr) -> Box<dyn ContentServer>;
}

/// URL path segment for a file, limited to characters safe in a URL
pub(super) fn served_name(path: &Path) -> String {
    let name: String = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        "media".to_string()
    } else {
        name
    }
}

/// Serves a single file with axum on an ephemeral port
pub struct StaticFileServer {
    path: PathBuf,
    bind: IpAddr,
    shutdown_timeout: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    address: Option<SocketAddr>,
}

impl StaticFileServer {
    /// Create a stopped server for `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, bind: IpAddr, shutdown_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            bind,
            shutdown_timeout,
            cancel: CancellationToken::new(),
            task: None,
            address: None,
        }
    }

    /// Address the server listens on while running
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.address
    }
}

#[async_trait]
impl ContentServer for StaticFileServer {
    async fn start(&mut self) -> Result<String, AirPlayError> {
        let name = served_name(&self.path);
        if let Some(address) = self.address {
            return Ok(format!("http://{address}/{name}"));
        }

        let listener = TcpListener::bind(SocketAddr::new(self.bind, 0))
            .await
            .map_err(|e| AirPlayError::LocalServer {
                message: format!("failed to bind {}", self.bind),
                source: Some(Box::new(e)),
            })?;
        let address = listener.local_addr()?;

        let app = Router::new().route_service(&format!("/{name}"), ServeFile::new(&self.path));

        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
            {
                tracing::warn!("Content server on {} failed: {}", address, e);
            }
        }));
        self.address = Some(address);

        tracing::info!("Serving {} on http://{}/{}", self.path.display(), address, name);
        Ok(format!("http://{address}/{name}"))
    }

    async fn stop(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };

        self.cancel.cancel();
        if tokio::time::timeout(self.shutdown_timeout, &mut task)
            .await
            .is_err()
        {
            tracing::warn!(
                "Content server did not stop within {:?}, aborting",
                self.shutdown_timeout
            );
            task.abort();
        }

        if let Some(address) = self.address.take() {
            tracing::debug!("Content server on {} stopped", address);
        }
    }
}

impl Drop for StaticFileServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StaticFileServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticFileServer")
            .field("path", &self.path)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Factory for [`StaticFileServer`]
#[derive(Debug, Clone, Copy)]
pub struct StaticFileServerFactory {
    shutdown_timeout: Duration,
}

impl StaticFileServerFactory {
    /// Factory whose servers wait `shutdown_timeout` for graceful shutdown
    #[must_use]
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self { shutdown_timeout }
    }
}

impl Default for StaticFileServerFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ContentServerFactory for StaticFileServerFactory {
    fn create(&self, path: &Path, bind: IpAddr) -> Box<dyn ContentServer> {
        Box::new(StaticFileServer::new(path, bind, self.shutdown_timeout))
    }
}
