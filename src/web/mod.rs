//! HTTP API for the scale.
//!
//! Serves the current reading, history and calibration controls under
//! `/api/labjack`, plus a health check and a root page.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{Result, ScaleError};
use crate::sampling::ScaleService;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Start the web server and run until `shutdown` resolves.
pub async fn start_web_server<F>(
    config: WebConfig,
    service: Arc<ScaleService>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&config, service);

    // Parse the bind address
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| ScaleError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ScaleError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Starting LabJack scale server on http://{}", addr);
    info!("API endpoint: http://{}/api/labjack/ain1", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ScaleError::web_server_error(format!("Server error: {}", e)))?;

    info!("Web server stopped");
    Ok(())
}
