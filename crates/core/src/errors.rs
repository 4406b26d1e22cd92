//! Error types and handling
//!
//! The taxonomy mirrors how the controller reports failures: domain enums for
//! configuration and the container runtime, wrapped by [`DockhandError`], which
//! also carries the lifecycle-specific outcomes (failure states, timeouts,
//! data write failures). Each top-level error maps to one HTTP status code.

use crate::docker::ContainerState;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Docker/Runtime-related errors
#[derive(Error, Debug)]
pub enum DockerError {
    /// Docker is not installed or not accessible
    #[error("Docker is not installed or not accessible")]
    NotInstalled,

    /// Docker CLI command error
    #[error("Docker CLI error: {0}")]
    CLIError(String),

    /// Container not found
    #[error("Container not found: {name}")]
    ContainerNotFound { name: String },

    /// Image not found
    #[error("Image '{image}' not found. Please build it first.")]
    ImageNotFound { image: String },

    /// Image build exited unsuccessfully; `logs` holds the captured build output
    #[error("Image build failed")]
    BuildFailed { logs: String },
}

/// Lifecycle operation names used in timeout reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Start,
    Stop,
    Restart,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error enum for every controller operation
#[derive(Error, Debug)]
pub enum DockhandError {
    /// The container engine could not be reached when the adapter connected
    #[error("Runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    /// Docker/Runtime-related errors
    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Container reached a failure state while starting
    #[error("Container failed to start")]
    FailedToStart { logs: String },

    /// Container reached a failure state while restarting
    #[error("Container failed on restart")]
    FailedOnRestart { logs: String },

    /// Convergence was not observed within the poll bound
    #[error("Container {operation} timed out after {attempts} attempts")]
    Timeout { operation: Operation, attempts: u32 },

    /// Stopping or removing the old container during rebuild failed
    #[error("Error removing old container: {0}")]
    Teardown(#[source] Box<DockhandError>),

    /// Start found the container in a state it will not replace
    #[error("Container is {state}; refusing to replace it")]
    Conflict { state: ContainerState },

    /// Request body could not be decoded
    #[error("Invalid request body: {message}")]
    InvalidRequest { message: String },

    /// Rejected data file name
    #[error("Invalid filename '{filename}': must be a plain file name")]
    InvalidFilename { filename: String },

    /// Writing the mounted data file failed. The container restart still ran;
    /// `restart` holds its error when that failed too.
    #[error("Failed to write to file {}: {source}", path.display())]
    DataWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        restart: Option<Box<DockhandError>>,
    },

    /// Internal/generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DockhandError {
    /// HTTP status code used by the control surface for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RuntimeUnavailable { .. } => 503,
            Self::Docker(DockerError::ContainerNotFound { .. })
            | Self::Docker(DockerError::ImageNotFound { .. }) => 404,
            Self::InvalidFilename { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::InvalidRequest { .. } => 422,
            Self::Timeout { .. } => 504,
            _ => 500,
        }
    }

    /// Whether this error means the container (or image) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Docker(DockerError::ContainerNotFound { .. })
                | Self::Docker(DockerError::ImageNotFound { .. })
        )
    }
}

/// Convenience type alias for Results with DockhandError
pub type Result<T> = std::result::Result<T, DockhandError>;
