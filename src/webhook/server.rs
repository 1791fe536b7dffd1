//! Webhook Server
//!
//! Serves the admission router until shutdown is signalled.

use crate::error::{Error, Result};
use crate::metrics::WebhookMetrics;
use crate::webhook::decision::DecisionEngine;
use crate::webhook::rest::WebhookRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the webhook server
#[derive(Debug, Clone)]
pub struct WebhookServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Max admission review body size
    pub max_body_size: usize,
}

impl Default for WebhookServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            max_body_size: 3 * 1024 * 1024, // 3MB
        }
    }
}

// =============================================================================
// Webhook Server
// =============================================================================

pub struct WebhookServer {
    config: WebhookServerConfig,
    engine: Arc<DecisionEngine>,
    metrics: WebhookMetrics,
}

impl WebhookServer {
    pub fn new(
        config: WebhookServerConfig,
        engine: Arc<DecisionEngine>,
        metrics: WebhookMetrics,
    ) -> Self {
        Self {
            config,
            engine,
            metrics,
        }
    }

    /// Serve admission reviews until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let app = WebhookRouter::new(self.engine, self.metrics, self.config.max_body_size).build();

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind webhook server: {}", e)))?;

        info!("Webhook listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Webhook server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Webhook server error: {}", e)))?;

        Ok(())
    }
}
