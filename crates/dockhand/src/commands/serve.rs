//! Serve command implementation
//!
//! Runs the HTTP control API until Ctrl-C.

use anyhow::{Context, Result};
use dockhand_core::api;
use dockhand_core::lifecycle::Controller;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Serve command arguments
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Listen address overriding the configured one
    pub listen: Option<String>,
}

/// Execute the serve command
#[instrument(skip(controller))]
pub async fn execute_serve(controller: Controller, args: ServeArgs) -> Result<()> {
    let listen = args
        .listen
        .unwrap_or_else(|| controller.config().listen.clone());

    if controller.runtime().is_available() {
        info!(
            "Managing container '{}' (image '{}')",
            controller.config().container_name,
            controller.config().image_tag
        );
    } else {
        warn!("Container runtime unavailable; lifecycle endpoints will answer 503");
    }

    api::serve(Arc::new(controller), &listen)
        .await
        .with_context(|| format!("Failed to serve control API on {}", listen))
}
