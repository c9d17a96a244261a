//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{LinkgateError, Result};

/// HTTP server for the gateway.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Fully layered application router
    app: Router,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, app: Router) -> Self {
        Self { addr, app }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server stops accepting connections when the provided signal
    /// resolves and returns once in-flight requests have finished.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            LinkgateError::Io(e)
        })?;

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            LinkgateError::Io(e)
        })
    }
}
