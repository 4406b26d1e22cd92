//! Lifecycle operations for the managed container
//!
//! Each operation issues one command to the runtime and then hands over to the
//! convergence poller, turning the engine's "command accepted" answer into a
//! bounded, synchronous result:
//!
//! | Operation   | Short-circuit                 | Success states | Failure states |
//! |-------------|-------------------------------|----------------|----------------|
//! | start       | already running               | running        | exited, dead   |
//! | stop        | already exited, or absent     | exited         | none           |
//! | restart     | container must exist          | running        | exited, dead   |
//!
//! Rebuild and data updates compose these steps. All mutating operations run
//! under one single-flight guard, so overlapping requests are serialized
//! instead of racing at the engine.

use crate::config::ControllerConfig;
use crate::docker::{ContainerState, Docker, RunSpec};
use crate::errors::{DockerError, DockhandError, Operation, Result};
use crate::poll::{await_state, PollConfig, PollOutcome};
use crate::runtime::RuntimeHandle;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::path::Component;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

const FAILURE_STATES: &[ContainerState] = &[ContainerState::Exited, ContainerState::Dead];

/// Result of a status query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Found {
        container_name: String,
        state: ContainerState,
    },
    NotFound,
}

impl Serialize for StatusReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        match self {
            Self::Found {
                container_name,
                state,
            } => {
                map.serialize_entry("container_name", container_name)?;
                map.serialize_entry("status", state)?;
            }
            Self::NotFound => map.serialize_entry("status", "not_found")?,
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StartOutcome {
    AlreadyRunning,
    StartedAndRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StopOutcome {
    AlreadyStopped,
    StoppedAndVerified,
    NotFoundOrAlreadyStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestartOutcome {
    RestartedAndRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DataUpdateOutcome {
    DataUpdatedAndRestarted { filename: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildOutcome {
    RebuildAndRestartSuccessful {
        final_container_status: StartOutcome,
        build_logs: String,
    },
}

/// Accept only a single normal path component, so writes stay inside the
/// mounted data directory.
pub fn validate_filename(filename: &str) -> Result<()> {
    let invalid = || DockhandError::InvalidFilename {
        filename: filename.to_string(),
    };

    if filename.is_empty() || filename.contains('/') || filename.contains('\\') {
        return Err(invalid());
    }
    let mut components = std::path::Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Drives the single managed container
#[derive(Debug)]
pub struct Controller {
    runtime: RuntimeHandle,
    config: ControllerConfig,
    poll: PollConfig,
    guard: Mutex<()>,
}

impl Controller {
    pub fn new(runtime: RuntimeHandle, config: ControllerConfig) -> Self {
        let poll = config.poll_config();
        Self {
            runtime,
            config,
            poll,
            guard: Mutex::new(()),
        }
    }

    /// Override the poll bounds taken from the configuration
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn runtime(&self) -> &RuntimeHandle {
        &self.runtime
    }

    fn name(&self) -> &str {
        &self.config.container_name
    }

    fn run_spec(&self) -> RunSpec {
        RunSpec {
            name: self.config.container_name.clone(),
            image: self.config.image_tag.clone(),
            host_path: self.config.host_data_dir.clone(),
            container_path: self.config.container_data_path.clone(),
            env_passthrough: self.config.env_passthrough.clone(),
        }
    }

    /// Read the container state once
    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<StatusReport> {
        Ok(match self.runtime.inspect_container(self.name()).await? {
            Some(info) => StatusReport::Found {
                container_name: info.name,
                state: info.state,
            },
            None => StatusReport::NotFound,
        })
    }

    /// Create and run the container unless it is already running
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<StartOutcome> {
        let _guard = self.guard.lock().await;
        self.start_locked().await
    }

    /// Stop the container and wait until it reports exited
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<StopOutcome> {
        let _guard = self.guard.lock().await;
        self.stop_locked().await
    }

    /// Restart an existing container and wait until it runs again
    #[instrument(skip(self))]
    pub async fn restart(&self) -> Result<RestartOutcome> {
        let _guard = self.guard.lock().await;
        self.restart_locked().await
    }

    /// Tear down the container, rebuild the image, and start a fresh container.
    ///
    /// Any failing step aborts the rest. A failed build leaves the container
    /// absent; nothing is rolled back.
    #[instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<RebuildOutcome> {
        let _guard = self.guard.lock().await;

        info!("Starting rebuild: stopping and removing old container");
        self.teardown().await.map_err(|e| match e {
            DockhandError::RuntimeUnavailable { .. } => e,
            other => DockhandError::Teardown(Box::new(other)),
        })?;

        info!(
            "Building image '{}' from {}",
            self.config.image_tag,
            self.config.build_context.display()
        );
        let mut build_logs = String::new();
        self.runtime
            .build_image(
                &self.config.build_context,
                &self.config.image_tag,
                &mut |line: &str| {
                    info!(target: "dockhand::build", "{}", line);
                    build_logs.push_str(line);
                    build_logs.push('\n');
                },
            )
            .await?;
        info!("Build successful, starting new container");

        let final_container_status = self.start_locked().await?;
        Ok(RebuildOutcome::RebuildAndRestartSuccessful {
            final_container_status,
            build_logs,
        })
    }

    /// Stop the container, overwrite `filename` in the host data directory,
    /// and restart.
    ///
    /// The restart runs even when the write fails; the write error is then
    /// reported with the restart error, if any, attached.
    #[instrument(skip(self, content))]
    pub async fn update_data(&self, filename: &str, content: &str) -> Result<DataUpdateOutcome> {
        validate_filename(filename)?;
        let _guard = self.guard.lock().await;

        info!("Starting data update for {}", filename);
        let stopped = self.stop_locked().await?;
        debug!("Stop before data update: {:?}", stopped);

        let path = self.config.host_data_dir.join(filename);
        let write_result = tokio::fs::write(&path, content.as_bytes()).await;
        if write_result.is_err() {
            warn!("File write failed. Attempting to restart container anyway");
        }

        let restart_result = self.restart_locked().await;

        match (write_result, restart_result) {
            (Ok(()), Ok(_)) => {
                info!("Data update completed: {}", path.display());
                Ok(DataUpdateOutcome::DataUpdatedAndRestarted {
                    filename: filename.to_string(),
                })
            }
            (Ok(()), Err(restart_error)) => Err(restart_error),
            (Err(source), restart_result) => Err(DockhandError::DataWrite {
                path,
                source,
                restart: restart_result.err().map(Box::new),
            }),
        }
    }

    async fn start_locked(&self) -> Result<StartOutcome> {
        let name = self.name();

        if let Some(info) = self.runtime.inspect_container(name).await? {
            match info.state {
                ContainerState::Running => {
                    debug!("{} is already running", name);
                    return Ok(StartOutcome::AlreadyRunning);
                }
                // A leftover container holds the fixed name and would block creation
                ContainerState::Created | ContainerState::Exited | ContainerState::Dead => {
                    info!("Removing stale container {} in state {}", name, info.state);
                    ignore_not_found(self.runtime.remove_container(name).await)?;
                }
                // Paused or mid-transition containers still own a live process
                state => {
                    warn!("Not replacing container {} in state {}", name, state);
                    return Err(DockhandError::Conflict { state });
                }
            }
        }

        info!(
            "Starting container '{}' from image '{}'",
            name, self.config.image_tag
        );
        self.runtime.run_container(&self.run_spec()).await?;

        match await_state(
            &self.runtime,
            name,
            &[ContainerState::Running],
            FAILURE_STATES,
            &self.poll,
        )
        .await?
        {
            PollOutcome::Converged(_) => Ok(StartOutcome::StartedAndRunning),
            PollOutcome::Failed { logs, .. } => Err(DockhandError::FailedToStart { logs }),
            PollOutcome::TimedOut { attempts, .. } => Err(DockhandError::Timeout {
                operation: Operation::Start,
                attempts,
            }),
        }
    }

    async fn stop_locked(&self) -> Result<StopOutcome> {
        let name = self.name();

        let Some(info) = self.runtime.inspect_container(name).await? else {
            return Ok(StopOutcome::NotFoundOrAlreadyStopped);
        };
        if info.state == ContainerState::Exited {
            return Ok(StopOutcome::AlreadyStopped);
        }

        match self.runtime.stop_container(name).await {
            Err(e) if e.is_not_found() => return Ok(StopOutcome::NotFoundOrAlreadyStopped),
            other => other?,
        }

        match await_state(
            &self.runtime,
            name,
            &[ContainerState::Exited],
            &[],
            &self.poll,
        )
        .await?
        {
            PollOutcome::Converged(_) => Ok(StopOutcome::StoppedAndVerified),
            PollOutcome::TimedOut { attempts, .. } => Err(DockhandError::Timeout {
                operation: Operation::Stop,
                attempts,
            }),
            PollOutcome::Failed { state, .. } => Err(DockhandError::Internal(format!(
                "unexpected failure state {} while stopping",
                state
            ))),
        }
    }

    async fn restart_locked(&self) -> Result<RestartOutcome> {
        let name = self.name();

        if self.runtime.inspect_container(name).await?.is_none() {
            return Err(DockerError::ContainerNotFound {
                name: name.to_string(),
            }
            .into());
        }
        self.runtime.restart_container(name).await?;

        match await_state(
            &self.runtime,
            name,
            &[ContainerState::Running],
            FAILURE_STATES,
            &self.poll,
        )
        .await?
        {
            PollOutcome::Converged(_) => Ok(RestartOutcome::RestartedAndRunning),
            PollOutcome::Failed { logs, .. } => Err(DockhandError::FailedOnRestart { logs }),
            PollOutcome::TimedOut { attempts, .. } => Err(DockhandError::Timeout {
                operation: Operation::Restart,
                attempts,
            }),
        }
    }

    /// Stop and remove the current container; absence is fine
    async fn teardown(&self) -> Result<()> {
        let name = self.name();

        if self.runtime.inspect_container(name).await?.is_none() {
            info!("No existing container found. Proceeding to build");
            return Ok(());
        }

        info!("Found existing container '{}'. Stopping", name);
        ignore_not_found(self.runtime.stop_container(name).await)?;
        info!("Removing container");
        ignore_not_found(self.runtime.remove_container(name).await)?;
        info!("Old container removed");
        Ok(())
    }
}

fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}
