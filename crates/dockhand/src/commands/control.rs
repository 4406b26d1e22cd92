//! One-shot lifecycle commands
//!
//! Each command runs a single controller operation and prints the same JSON
//! the HTTP API would return. Failures print `{"detail": ...}` on stdout as
//! well, then propagate so the process exits non-zero.

use anyhow::{Context, Result};
use dockhand_core::api::error_detail;
use dockhand_core::errors::DockhandError;
use dockhand_core::lifecycle::Controller;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Where `update-data` takes the new file content from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Inline(String),
    File(PathBuf),
}

impl DataSource {
    async fn read(self) -> Result<String> {
        match self {
            Self::Inline(content) => Ok(content),
            Self::File(path) => tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read content from {}", path.display())),
        }
    }
}

/// A single lifecycle operation requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    Status,
    Start,
    Stop,
    Restart,
    Rebuild,
    UpdateData { filename: String, source: DataSource },
}

/// Execute one lifecycle operation and print its result
#[instrument(skip(controller))]
pub async fn execute_control(controller: &Controller, action: ControlAction) -> Result<()> {
    match run_action(controller, action).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            if let Some(e) = err.downcast_ref::<DockhandError>() {
                println!("{}", json!({ "detail": error_detail(e) }));
            }
            Err(err)
        }
    }
}

async fn run_action(controller: &Controller, action: ControlAction) -> Result<Value> {
    debug!("Running {:?}", action);
    let value = match action {
        ControlAction::Status => serde_json::to_value(controller.status().await?)?,
        ControlAction::Start => serde_json::to_value(controller.start().await?)?,
        ControlAction::Stop => serde_json::to_value(controller.stop().await?)?,
        ControlAction::Restart => serde_json::to_value(controller.restart().await?)?,
        ControlAction::Rebuild => serde_json::to_value(controller.rebuild().await?)?,
        ControlAction::UpdateData { filename, source } => {
            let content = source.read().await?;
            serde_json::to_value(controller.update_data(&filename, &content).await?)?
        }
    };
    Ok(value)
}
