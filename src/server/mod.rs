// ABOUTME: HTTP/WebSocket server exposing terminal sessions to the browser
// Hosts the exec endpoint plus the namespace and pod listings it is launched from

pub mod routes;
pub mod socket;

use crate::config::ServerConfig;
use anyhow::Result;
use tracing::{info, warn};

pub use routes::{create_router, with_assets, ApiResponse, AppState};

/// Web server instance
pub struct WebServer {
    config: ServerConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until Ctrl-C
    pub async fn start(self) -> Result<()> {
        let mut app = create_router(self.state);

        if let Some(web_dir) = &self.config.web_dir {
            if web_dir.exists() {
                info!("Serving browser terminal from: {}", web_dir.display());
                app = with_assets(app, web_dir);
            } else {
                warn!("Web directory {} not found, browser terminal disabled", web_dir.display());
            }
        }

        let listener = tokio::net::TcpListener::bind(&self.config.bind).await?;
        let addr = listener.local_addr()?;
        info!("Terminal server listening on http://{}", addr);
        info!("Browser terminal: http://{}/page/terminal/", addr);
        info!("WebSocket endpoint: ws://{}/terminal/exec", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Terminal server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
