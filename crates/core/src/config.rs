//! Controller configuration
//!
//! The controller manages exactly one container, so its configuration is a
//! small fixed set: the container name, image tag, the host directory that is
//! bind-mounted into the container, the build context, and the poll bounds.
//!
//! Configuration is read from a TOML file when one is given (or when
//! `dockhand.toml` exists in the working directory); every field has a default,
//! so an empty file or no file at all is valid.
//!
//! ```toml
//! container_name = "my-trading-bot-managed"
//! image_tag = "trading-bot"
//! host_data_dir = "./app/trading_data"
//!
//! [poll]
//! max_attempts = 10
//! interval_secs = 1
//! ```

use crate::errors::{ConfigError, Result};
use crate::poll::PollConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// File name looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "dockhand.toml";

/// Convergence bounds as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_secs: 1,
        }
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        PollConfig::new(
            settings.max_attempts,
            Duration::from_secs(settings.interval_secs),
        )
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Fixed name of the managed container
    pub container_name: String,
    /// Tag the image is built into and run from
    pub image_tag: String,
    /// Host directory bind-mounted read/write into the container
    pub host_data_dir: PathBuf,
    /// Mount point of `host_data_dir` inside the container
    pub container_data_path: String,
    /// Directory holding the Dockerfile
    pub build_context: PathBuf,
    /// Environment variable names forwarded to the container by name
    pub env_passthrough: Vec<String>,
    /// HTTP listen address for `serve`
    pub listen: String,
    pub poll: PollSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            container_name: "my-trading-bot-managed".to_string(),
            image_tag: "trading-bot".to_string(),
            host_data_dir: PathBuf::from("./app/trading_data"),
            container_data_path: "/app/data".to_string(),
            build_context: PathBuf::from("."),
            env_passthrough: vec!["APPKEY".to_string(), "APPSECRET".to_string()],
            listen: "127.0.0.1:8000".to_string(),
            poll: PollSettings::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from `path`, or from `dockhand.toml` in the working
    /// directory, or fall back to defaults. Relative paths are resolved against
    /// the working directory and the result is validated.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;

        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                Self::from_file(path)?
            }
            None => {
                let candidate = cwd.join(DEFAULT_CONFIG_FILE);
                if candidate.exists() {
                    Self::from_file(&candidate)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };

        let config = config.resolve_paths(&cwd);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file without resolving or validating
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::Parsing {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Make host-side paths absolute relative to `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.host_data_dir.is_relative() {
            self.host_data_dir = normalize(&base.join(&self.host_data_dir));
        }
        if self.build_context.is_relative() {
            self.build_context = normalize(&base.join(&self.build_context));
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(ConfigError::Validation {
                message: message.to_string(),
            }
            .into())
        };

        if self.container_name.trim().is_empty() {
            return invalid("container_name must not be empty");
        }
        if self.image_tag.trim().is_empty() {
            return invalid("image_tag must not be empty");
        }
        if !self.container_data_path.starts_with('/') {
            return invalid("container_data_path must be an absolute path");
        }
        if self.poll.max_attempts == 0 {
            return invalid("poll.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig::from(&self.poll)
    }
}

/// Lexically drop `.` components and fold `..` into their parent
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
