//! Container runtime selection and connection handling
//!
//! The controller never talks to the engine directly; it holds a
//! [`RuntimeHandle`], which is either connected to a [`Docker`] implementation
//! or permanently unavailable because the startup ping failed.

use crate::docker::{BuildSink, CliRuntime, ContainerInfo, Docker, RunSpec};
use crate::errors::{DockerError, DockhandError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = DockhandError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(DockerError::CLIError(format!(
                "Unknown runtime: {}. Supported runtimes: docker, podman",
                s
            ))
            .into()),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime factory for creating container runtime instances
pub struct RuntimeFactory;

impl RuntimeFactory {
    /// Detect runtime from CLI flag, environment variable, or default
    ///
    /// Precedence: CLI flag > DOCKHAND_RUNTIME env var > default (docker)
    pub fn detect_runtime(cli_runtime: Option<RuntimeKind>) -> RuntimeKind {
        if let Some(runtime) = cli_runtime {
            return runtime;
        }

        if let Ok(env_runtime) = std::env::var("DOCKHAND_RUNTIME") {
            if let Ok(runtime) = env_runtime.parse() {
                return runtime;
            }
        }

        RuntimeKind::Docker
    }

    /// Create the CLI runtime for `kind`, honouring an explicit binary path
    pub fn create_runtime(kind: RuntimeKind, binary_path: Option<&str>) -> CliRuntime {
        match (binary_path, kind) {
            (Some(path), _) => CliRuntime::with_runtime_path(path.to_string()),
            (None, RuntimeKind::Docker) => CliRuntime::docker(),
            (None, RuntimeKind::Podman) => CliRuntime::podman(),
        }
    }
}

/// Process-wide connection to the container engine
///
/// Built once at startup. When the liveness ping fails the handle becomes
/// `Unavailable` and every call fails with `RuntimeUnavailable` without
/// reaching the engine.
#[derive(Clone)]
pub enum RuntimeHandle {
    Connected(Arc<dyn Docker>),
    Unavailable { reason: String },
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected(_) => f.write_str("RuntimeHandle::Connected"),
            Self::Unavailable { reason } => f
                .debug_struct("RuntimeHandle::Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

impl RuntimeHandle {
    /// Ping the engine once and wrap it, degrading to `Unavailable` on failure
    pub async fn connect(docker: Arc<dyn Docker>) -> Self {
        match docker.ping().await {
            Ok(()) => {
                info!("Successfully connected to container runtime daemon");
                Self::Connected(docker)
            }
            Err(e) => {
                warn!("Error connecting to container runtime daemon: {}", e);
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Handle that never reaches an engine
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    fn docker(&self) -> Result<&Arc<dyn Docker>> {
        match self {
            Self::Connected(docker) => Ok(docker),
            Self::Unavailable { reason } => Err(DockhandError::RuntimeUnavailable {
                reason: reason.clone(),
            }),
        }
    }
}

#[async_trait]
impl Docker for RuntimeHandle {
    async fn ping(&self) -> Result<()> {
        self.docker()?.ping().await
    }

    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInfo>> {
        self.docker()?.inspect_container(name).await
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<String> {
        self.docker()?.run_container(spec).await
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        self.docker()?.stop_container(name).await
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        self.docker()?.restart_container(name).await
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.docker()?.remove_container(name).await
    }

    async fn container_logs(&self, name: &str) -> Result<String> {
        self.docker()?.container_logs(name).await
    }

    async fn build_image(
        &self,
        context: &Path,
        tag: &str,
        sink: &mut BuildSink<'_>,
    ) -> Result<()> {
        self.docker()?.build_image(context, tag, sink).await
    }
}
