//! API Server - binds the router and serves it to completion or shutdown.

use crate::api::handlers::AppState;
use crate::api::routes::create_router;
use crate::api::ApiConfig;
use crate::utils::error::{ProxyError, ProxyResult};
use crate::utils::shutdown::ShutdownManager;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Owns the bound router; `serve` runs until the listener errors or a
/// shutdown signal fires.
pub struct ApiServer {
    config: ApiConfig,
    app: Router,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        let app = create_router(&config, state);
        Self { config, app }
    }

    /// Bind and serve, stopping gracefully when `shutdown` fires.
    pub async fn serve(self, shutdown: &ShutdownManager) -> ProxyResult<()> {
        let addr: SocketAddr = self
            .config
            .bind
            .parse()
            .map_err(|e| ProxyError::Config(format!("invalid bind address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Config(format!("failed to bind {}: {}", addr, e)))?;

        log::info!("API server listening on http://{}", addr);
        log::info!(
            "authentication: {}",
            if self.config.enable_auth { "enabled" } else { "disabled" }
        );

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                log::info!("API server shutting down");
            })
            .await
            .map_err(|e| ProxyError::Config(format!("server error: {}", e)))
    }
}
