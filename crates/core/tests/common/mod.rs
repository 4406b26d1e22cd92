//! Shared test helpers for core integration tests.

#![allow(dead_code)]

use dockhand_core::config::ControllerConfig;
use dockhand_core::docker::mock::MockDocker;
use dockhand_core::docker::Docker;
use dockhand_core::lifecycle::Controller;
use dockhand_core::poll::PollConfig;
use dockhand_core::runtime::RuntimeHandle;
use std::path::Path;
use std::sync::Arc;

pub const CONTAINER: &str = "my-trading-bot-managed";
pub const IMAGE: &str = "trading-bot";

/// Configuration pointing the bind mount at `data_dir`
pub fn test_config(data_dir: &Path) -> ControllerConfig {
    ControllerConfig {
        host_data_dir: data_dir.to_path_buf(),
        build_context: data_dir.to_path_buf(),
        ..Default::default()
    }
}

/// Controller over `mock` that polls without sleeping
pub fn controller(mock: &Arc<MockDocker>, data_dir: &Path) -> Controller {
    let docker: Arc<dyn Docker> = mock.clone();
    Controller::new(RuntimeHandle::Connected(docker), test_config(data_dir))
        .with_poll_config(PollConfig::immediate(10))
}

/// Mock runtime that already holds the application image
pub fn mock_with_image() -> Arc<MockDocker> {
    let mock = Arc::new(MockDocker::new());
    mock.add_image(IMAGE);
    mock
}
