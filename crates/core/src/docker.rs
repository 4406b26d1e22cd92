//! Container engine adapter
//!
//! This module defines the capability trait the controller drives, a CLI-based
//! implementation that shells out to `docker` or `podman`, and an in-memory mock
//! used by the test suites.

use crate::errors::{DockerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument, warn};

/// Lifecycle state of the managed container as reported by the engine.
///
/// `Absent` is never reported by the engine itself: it stands for a lookup that
/// found no container under the configured name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
        }
    }
}

impl std::str::FromStr for ContainerState {
    type Err = DockerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "restarting" => Ok(Self::Restarting),
            "removing" => Ok(Self::Removing),
            "exited" => Ok(Self::Exited),
            "dead" => Ok(Self::Dead),
            other => Err(DockerError::CLIError(format!(
                "Unknown container state: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container information returned by inspect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container ID
    pub id: String,
    /// Container name without the leading slash
    pub name: String,
    /// Image the container was created from
    pub image: String,
    /// Current lifecycle state
    pub state: ContainerState,
}

/// Everything needed to create and run the managed container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    /// Host side of the read/write bind mount
    pub host_path: PathBuf,
    /// Container side of the bind mount
    pub container_path: String,
    /// Environment variable names forwarded from this process by name only
    pub env_passthrough: Vec<String>,
}

impl RunSpec {
    /// Arguments for `<runtime> run`, detached, never pulling.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--pull".to_string(),
            "never".to_string(),
            "--volume".to_string(),
            format!("{}:{}:rw", self.host_path.display(), self.container_path),
        ];
        for name in &self.env_passthrough {
            args.push("--env".to_string());
            args.push(name.clone());
        }
        args.push(self.image.clone());
        args
    }
}

/// Receiver for streamed build output, one line per call
pub type BuildSink<'a> = dyn for<'l> FnMut(&'l str) + Send + 'a;

/// Container engine capability set used by the controller
#[async_trait]
pub trait Docker: Send + Sync {
    /// Health check for daemon availability
    async fn ping(&self) -> Result<()>;

    /// Look up a container by name; `None` when it does not exist
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInfo>>;

    /// Create and start a container, returning its ID
    async fn run_container(&self, spec: &RunSpec) -> Result<String>;

    /// Issue a stop command
    async fn stop_container(&self, name: &str) -> Result<()>;

    /// Issue a restart command
    async fn restart_container(&self, name: &str) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Fetch the container's log output decoded as text
    async fn container_logs(&self, name: &str) -> Result<String>;

    /// Build an image from `context` tagged `tag`, handing every output line
    /// to `sink` as it arrives
    async fn build_image(
        &self,
        context: &Path,
        tag: &str,
        sink: &mut BuildSink<'_>,
    ) -> Result<()>;
}

fn is_missing_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

fn is_missing_image(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such image")
        || lower.contains("unable to find image")
        || lower.contains("image not known")
}

/// Parse `<runtime> inspect` JSON output into ContainerInfo
pub fn parse_container_inspect(json_output: &str) -> Result<Option<ContainerInfo>> {
    if json_output.trim().is_empty() {
        return Ok(None);
    }

    let containers: Vec<serde_json::Value> = serde_json::from_str(json_output.trim())
        .map_err(|e| DockerError::CLIError(format!("Failed to parse inspect JSON: {}", e)))?;

    let Some(container) = containers.first() else {
        return Ok(None);
    };

    let field = |value: Option<&serde_json::Value>| {
        value
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    let state: ContainerState = container
        .get("State")
        .and_then(|s| s.get("Status"))
        .and_then(|s| s.as_str())
        .ok_or_else(|| DockerError::CLIError("Inspect output has no State.Status".to_string()))?
        .parse()?;

    Ok(Some(ContainerInfo {
        id: field(container.get("Id")),
        name: field(container.get("Name")).trim_start_matches('/').to_string(),
        image: field(container.get("Config").and_then(|c| c.get("Image"))),
        state,
    }))
}

/// Generic CLI-based container runtime implementation
///
/// Docker and Podman share a compatible CLI, so one implementation serves both.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    /// Container runtime CLI binary path (e.g., "docker" or "podman")
    runtime_path: String,
}

impl CliRuntime {
    /// Create a new CliRuntime for Docker
    pub fn docker() -> Self {
        Self {
            runtime_path: "docker".to_string(),
        }
    }

    /// Create a new CliRuntime for Podman
    pub fn podman() -> Self {
        Self {
            runtime_path: "podman".to_string(),
        }
    }

    /// Create a new CliRuntime with custom runtime binary path
    pub fn with_runtime_path(runtime_path: String) -> Self {
        Self { runtime_path }
    }

    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }

    /// Run the runtime binary on a blocking thread and collect its output
    async fn execute(&self, args: Vec<String>) -> Result<Output> {
        debug!(
            "Executing runtime command: {} {}",
            self.runtime_path,
            args.join(" ")
        );

        let runtime_path = self.runtime_path.clone();
        tokio::task::spawn_blocking(move || {
            Command::new(&runtime_path).args(&args).output().map_err(|e| {
                debug!("Failed to execute runtime binary: {}", e);
                DockerError::NotInstalled
            })
        })
        .await
        .map_err(|e| DockerError::CLIError(format!("Task join error: {}", e)))?
        .map_err(Into::into)
    }

    /// Run a command that targets the named container, mapping "no such
    /// container" to `ContainerNotFound`
    async fn execute_on_container(&self, verb: &str, name: &str) -> Result<Output> {
        let output = self.execute(vec![verb.to_string(), name.to_string()]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                return Err(DockerError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into());
            }
            return Err(DockerError::CLIError(format!(
                "Runtime {} command failed: {}",
                verb,
                stderr.trim()
            ))
            .into());
        }
        Ok(output)
    }
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::docker()
    }
}

#[async_trait]
impl Docker for CliRuntime {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        debug!("Pinging container runtime daemon");

        let output = self
            .execute(vec![
                "version".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ])
            .await?;

        if output.status.success() {
            debug!("Container runtime daemon is available");
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DockerError::CLIError(format!("Runtime ping failed: {}", stderr.trim())).into())
        }
    }

    #[instrument(skip(self))]
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInfo>> {
        let output = self
            .execute(vec![
                "inspect".to_string(),
                "--type".to_string(),
                "container".to_string(),
                name.to_string(),
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                return Ok(None);
            }
            return Err(
                DockerError::CLIError(format!("Inspect command failed: {}", stderr.trim())).into(),
            );
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            DockerError::CLIError(format!("Invalid UTF-8 in runtime output: {}", e))
        })?;
        parse_container_inspect(&stdout)
    }

    #[instrument(skip(self))]
    async fn run_container(&self, spec: &RunSpec) -> Result<String> {
        let output = self.execute(spec.to_args()).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_image(&stderr) {
                return Err(DockerError::ImageNotFound {
                    image: spec.image.clone(),
                }
                .into());
            }
            return Err(
                DockerError::CLIError(format!("Run command failed: {}", stderr.trim())).into(),
            );
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("Started container {} ({})", spec.name, container_id);
        Ok(container_id)
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, name: &str) -> Result<()> {
        self.execute_on_container("stop", name).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn restart_container(&self, name: &str) -> Result<()> {
        self.execute_on_container("restart", name).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, name: &str) -> Result<()> {
        let output = self
            .execute(vec!["rm".to_string(), "-f".to_string(), name.to_string()])
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_container(&stderr) {
                return Err(DockerError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into());
            }
            return Err(
                DockerError::CLIError(format!("Remove command failed: {}", stderr.trim())).into(),
            );
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn container_logs(&self, name: &str) -> Result<String> {
        let output = self.execute_on_container("logs", name).await?;
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    #[instrument(skip(self, sink))]
    async fn build_image(
        &self,
        context: &Path,
        tag: &str,
        sink: &mut BuildSink<'_>,
    ) -> Result<()> {
        debug!("Building image {} from {}", tag, context.display());

        let mut child = tokio::process::Command::new(&self.runtime_path)
            .arg("build")
            .arg("--rm")
            .arg("--tag")
            .arg(tag)
            .arg(context)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                debug!("Failed to spawn build: {}", e);
                DockerError::NotInstalled
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DockerError::CLIError("Build stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DockerError::CLIError("Build stderr not captured".to_string()))?;
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();

        let mut captured = String::new();
        let mut record = |line: String| {
            let line = line.trim();
            if line.is_empty() {
                return;
            }
            sink(line);
            captured.push_str(line);
            captured.push('\n');
        };

        let (mut stdout_done, mut stderr_done) = (false, false);
        while !(stdout_done && stderr_done) {
            let read = tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => line.map(|line| {
                    stdout_done = line.is_none();
                    line
                }),
                line = stderr_lines.next_line(), if !stderr_done => line.map(|line| {
                    stderr_done = line.is_none();
                    line
                }),
            };

            match read {
                Ok(Some(line)) => record(line),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to read build output for {}, killing build: {}", tag, e);
                    if let Err(kill_error) = child.kill().await {
                        debug!("Failed to kill build process: {}", kill_error);
                    }
                    return Err(DockerError::CLIError(format!(
                        "Failed to read build output: {}",
                        e
                    ))
                    .into());
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DockerError::CLIError(format!("Failed to wait for build: {}", e)))?;

        if !status.success() {
            warn!("Image build for {} exited with {}", tag, status);
            return Err(DockerError::BuildFailed { logs: captured }.into());
        }

        Ok(())
    }
}

pub mod mock {
    //! Mock Docker runtime for testing lifecycle flows
    //!
    //! State changes are scripted: every command enqueues the states the
    //! container will report on subsequent inspects, one state per read. Once
    //! the queue drains, the last state sticks.

    use super::{BuildSink, ContainerInfo, ContainerState, Docker, RunSpec};
    use crate::errors::{DockerError, Result};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::path::{Path, PathBuf};
    use std::sync::{Mutex, MutexGuard};
    use tracing::debug;

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record of a runtime call, in the order calls were made
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockCall {
        Ping,
        Inspect(String),
        Run(RunSpec),
        Stop(String),
        Restart(String),
        Remove(String),
        Logs(String),
        Build { context: PathBuf, tag: String },
    }

    /// Mock container state for simulation
    #[derive(Debug, Clone)]
    pub struct MockContainer {
        pub id: String,
        pub name: String,
        pub image: String,
        pub state: ContainerState,
        /// States reported by upcoming inspects, front first
        pub pending: VecDeque<ContainerState>,
        pub logs: String,
    }

    impl MockContainer {
        /// Create a running mock container
        pub fn new(name: &str, image: &str) -> Self {
            Self {
                id: format!("mock-{}", name),
                name: name.to_string(),
                image: image.to_string(),
                state: ContainerState::Running,
                pending: VecDeque::new(),
                logs: String::new(),
            }
        }

        pub fn with_state(mut self, state: ContainerState) -> Self {
            self.state = state;
            self
        }

        pub fn with_logs(mut self, logs: &str) -> Self {
            self.logs = logs.to_string();
            self
        }

        fn info(&self) -> ContainerInfo {
            ContainerInfo {
                id: self.id.clone(),
                name: self.name.clone(),
                image: self.image.clone(),
                state: self.state,
            }
        }
    }

    /// Configuration for the MockDocker runtime
    #[derive(Debug, Clone)]
    pub struct MockDockerConfig {
        /// Whether ping should succeed
        pub ping_success: bool,
        /// States reported after `run`, one per inspect
        pub after_run: Vec<ContainerState>,
        /// States reported after `stop`
        pub after_stop: Vec<ContainerState>,
        /// States reported after `restart`
        pub after_restart: Vec<ContainerState>,
        /// Lines emitted by a build
        pub build_output: Vec<String>,
        /// When set, builds fail with these captured logs
        pub build_failure: Option<String>,
        /// Log text given to containers created by `run`
        pub run_logs: String,
    }

    impl Default for MockDockerConfig {
        fn default() -> Self {
            Self {
                ping_success: true,
                after_run: vec![ContainerState::Running],
                after_stop: vec![ContainerState::Exited],
                after_restart: vec![ContainerState::Running],
                build_output: vec![
                    "Step 1/2 : FROM python:3.11-slim".to_string(),
                    "Step 2/2 : CMD [\"python\", \"main.py\"]".to_string(),
                    "Successfully tagged trading-bot:latest".to_string(),
                ],
                build_failure: None,
                run_logs: String::new(),
            }
        }
    }

    /// Mock Docker runtime implementation
    #[derive(Debug, Default)]
    pub struct MockDocker {
        config: Mutex<MockDockerConfig>,
        containers: Mutex<HashMap<String, MockContainer>>,
        images: Mutex<HashSet<String>>,
        history: Mutex<Vec<MockCall>>,
    }

    impl MockDocker {
        /// Create a new MockDocker instance with default configuration
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a new MockDocker instance with custom configuration
        pub fn with_config(config: MockDockerConfig) -> Self {
            Self {
                config: Mutex::new(config),
                ..Self::default()
            }
        }

        /// Update mock configuration
        pub fn update_config<F>(&self, f: F)
        where
            F: FnOnce(&mut MockDockerConfig),
        {
            f(&mut lock(&self.config));
        }

        pub fn add_image(&self, tag: &str) {
            lock(&self.images).insert(tag.to_string());
        }

        pub fn has_image(&self, tag: &str) -> bool {
            lock(&self.images).contains(tag)
        }

        /// Add a mock container to the system
        pub fn add_container(&self, container: MockContainer) {
            lock(&self.containers).insert(container.name.clone(), container);
        }

        /// Queue states for upcoming inspects of `name`. A missing container is
        /// registered as absent first, so scripts may start from `Absent`.
        pub fn script_states(&self, name: &str, states: &[ContainerState]) {
            let mut containers = lock(&self.containers);
            let container = containers.entry(name.to_string()).or_insert_with(|| {
                MockContainer::new(name, "scripted").with_state(ContainerState::Absent)
            });
            container.pending.extend(states.iter().copied());
        }

        /// Current state without recording a call or consuming the script
        pub fn container_state(&self, name: &str) -> ContainerState {
            lock(&self.containers)
                .get(name)
                .map(|c| c.state)
                .unwrap_or(ContainerState::Absent)
        }

        /// Get history of calls made
        pub fn history(&self) -> Vec<MockCall> {
            lock(&self.history).clone()
        }

        pub fn clear_history(&self) {
            lock(&self.history).clear();
        }

        /// Number of recorded calls matching `predicate`
        pub fn count_calls<F>(&self, predicate: F) -> usize
        where
            F: Fn(&MockCall) -> bool,
        {
            lock(&self.history).iter().filter(|c| predicate(c)).count()
        }

        pub fn run_count(&self) -> usize {
            self.count_calls(|c| matches!(c, MockCall::Run(_)))
        }

        pub fn stop_count(&self) -> usize {
            self.count_calls(|c| matches!(c, MockCall::Stop(_)))
        }

        pub fn restart_count(&self) -> usize {
            self.count_calls(|c| matches!(c, MockCall::Restart(_)))
        }

        pub fn inspect_count(&self) -> usize {
            self.count_calls(|c| matches!(c, MockCall::Inspect(_)))
        }

        fn record(&self, call: MockCall) {
            debug!("Mock runtime call: {:?}", call);
            lock(&self.history).push(call);
        }

        /// Replace the pending script of an existing container
        fn transition(&self, name: &str, states: Vec<ContainerState>) -> Result<()> {
            let mut containers = lock(&self.containers);
            match containers.get_mut(name) {
                Some(container) if container.state != ContainerState::Absent => {
                    container.pending = states.into();
                    Ok(())
                }
                _ => Err(DockerError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into()),
            }
        }
    }

    #[async_trait]
    impl Docker for MockDocker {
        async fn ping(&self) -> Result<()> {
            self.record(MockCall::Ping);
            if lock(&self.config).ping_success {
                Ok(())
            } else {
                Err(DockerError::CLIError(
                    "Cannot connect to the Docker daemon".to_string(),
                )
                .into())
            }
        }

        async fn inspect_container(&self, name: &str) -> Result<Option<ContainerInfo>> {
            self.record(MockCall::Inspect(name.to_string()));
            let mut containers = lock(&self.containers);
            let Some(container) = containers.get_mut(name) else {
                return Ok(None);
            };
            if let Some(next) = container.pending.pop_front() {
                container.state = next;
            }
            if container.state == ContainerState::Absent {
                if container.pending.is_empty() {
                    containers.remove(name);
                }
                return Ok(None);
            }
            Ok(Some(container.info()))
        }

        async fn run_container(&self, spec: &RunSpec) -> Result<String> {
            self.record(MockCall::Run(spec.clone()));
            if !self.has_image(&spec.image) {
                return Err(DockerError::ImageNotFound {
                    image: spec.image.clone(),
                }
                .into());
            }

            let config = lock(&self.config).clone();
            let mut containers = lock(&self.containers);
            if let Some(existing) = containers.get(&spec.name) {
                if existing.state != ContainerState::Absent {
                    return Err(DockerError::CLIError(format!(
                        "Conflict. The container name \"/{}\" is already in use",
                        spec.name
                    ))
                    .into());
                }
            }

            let mut container = MockContainer::new(&spec.name, &spec.image)
                .with_state(ContainerState::Created)
                .with_logs(&config.run_logs);
            container.pending = config.after_run.into();
            let id = container.id.clone();
            containers.insert(spec.name.clone(), container);
            Ok(id)
        }

        async fn stop_container(&self, name: &str) -> Result<()> {
            self.record(MockCall::Stop(name.to_string()));
            let after = lock(&self.config).after_stop.clone();
            self.transition(name, after)
        }

        async fn restart_container(&self, name: &str) -> Result<()> {
            self.record(MockCall::Restart(name.to_string()));
            let after = lock(&self.config).after_restart.clone();
            self.transition(name, after)
        }

        async fn remove_container(&self, name: &str) -> Result<()> {
            self.record(MockCall::Remove(name.to_string()));
            match lock(&self.containers).remove(name) {
                Some(_) => Ok(()),
                None => Err(DockerError::ContainerNotFound {
                    name: name.to_string(),
                }
                .into()),
            }
        }

        async fn container_logs(&self, name: &str) -> Result<String> {
            self.record(MockCall::Logs(name.to_string()));
            lock(&self.containers)
                .get(name)
                .map(|c| c.logs.clone())
                .ok_or_else(|| {
                    DockerError::ContainerNotFound {
                        name: name.to_string(),
                    }
                    .into()
                })
        }

        async fn build_image(
            &self,
            context: &Path,
            tag: &str,
            sink: &mut BuildSink<'_>,
        ) -> Result<()> {
            self.record(MockCall::Build {
                context: context.to_path_buf(),
                tag: tag.to_string(),
            });
            let config = lock(&self.config).clone();

            if let Some(logs) = config.build_failure {
                for line in logs.lines() {
                    sink(line);
                }
                return Err(DockerError::BuildFailed { logs }.into());
            }

            for line in &config.build_output {
                sink(line);
            }
            self.add_image(tag);
            Ok(())
        }
    }
}
