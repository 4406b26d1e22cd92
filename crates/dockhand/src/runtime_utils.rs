//! Runtime utilities for connecting to the container engine from CLI flags

use dockhand_core::docker::Docker;
use dockhand_core::runtime::{RuntimeFactory, RuntimeHandle, RuntimeKind};
use std::sync::Arc;
use tracing::debug;

/// Resolve the runtime from flag, environment, or default, and ping it once.
///
/// A failed ping yields an unavailable handle rather than an error, so the
/// server can still come up and answer with 503.
pub async fn connect_runtime(
    runtime_flag: Option<RuntimeKind>,
    docker_path: Option<&str>,
) -> RuntimeHandle {
    let kind = RuntimeFactory::detect_runtime(runtime_flag);
    let runtime = RuntimeFactory::create_runtime(kind, docker_path);
    debug!("Using {} runtime at {}", kind, runtime.runtime_path());

    let docker: Arc<dyn Docker> = Arc::new(runtime);
    RuntimeHandle::connect(docker).await
}
