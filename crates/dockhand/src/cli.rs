use crate::commands::control::{execute_control, ControlAction, DataSource};
use crate::commands::serve::{execute_serve, ServeArgs};
use crate::runtime_utils::connect_runtime;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use dockhand_core::config::ControllerConfig;
use dockhand_core::lifecycle::Controller;
use dockhand_core::runtime::RuntimeKind;
use std::path::PathBuf;

/// Runtime selection options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum RuntimeOption {
    /// Docker runtime
    Docker,
    /// Podman runtime
    Podman,
}

impl From<RuntimeOption> for RuntimeKind {
    fn from(runtime: RuntimeOption) -> Self {
        match runtime {
            RuntimeOption::Docker => RuntimeKind::Docker,
            RuntimeOption::Podman => RuntimeKind::Podman,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Controller subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP control API
    Serve {
        /// Listen address (defaults to `listen` from the config file)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Print the managed container's state
    Status,
    /// Start the container and wait until it is running
    Start,
    /// Stop the container and wait until it has exited
    Stop,
    /// Restart the container and wait until it is running
    Restart,
    /// Remove the container, rebuild the image, and start a fresh container
    Rebuild,
    /// Overwrite a file in the mounted data directory and restart
    UpdateData {
        /// Plain file name inside the data directory
        #[arg(long)]
        filename: String,
        /// New file content
        #[arg(long, conflicts_with = "from_file", required_unless_present = "from_file")]
        content: Option<String>,
        /// Read the new file content from this path
        #[arg(long, value_name = "PATH")]
        from_file: Option<PathBuf>,
    },
}

/// Single-container lifecycle controller
#[derive(Debug, Parser)]
#[command(name = "dockhand", version, about, long_about = None)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via DOCKHAND_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (defaults to ./dockhand.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Container runtime (can be set via DOCKHAND_RUNTIME env var)
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeOption>,

    /// Path to the runtime executable
    #[arg(long, global = true, value_name = "BIN")]
    pub docker_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };

        let log_level = self.log_level.as_str();
        if std::env::var_os("DOCKHAND_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!(
                    "dockhand={0},dockhand_core={0},tower_http={0}",
                    log_level
                ),
            );
        }
        dockhand_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let config = ControllerConfig::load(self.config.as_deref())?;
        let runtime = connect_runtime(
            self.runtime.map(RuntimeKind::from),
            self.docker_path.as_deref(),
        )
        .await;
        let controller = Controller::new(runtime, config);

        let action = match self.command {
            Commands::Serve { listen } => {
                return execute_serve(controller, ServeArgs { listen }).await;
            }
            Commands::Status => ControlAction::Status,
            Commands::Start => ControlAction::Start,
            Commands::Stop => ControlAction::Stop,
            Commands::Restart => ControlAction::Restart,
            Commands::Rebuild => ControlAction::Rebuild,
            Commands::UpdateData {
                filename,
                content,
                from_file,
            } => ControlAction::UpdateData {
                filename,
                source: match (content, from_file) {
                    (Some(content), _) => DataSource::Inline(content),
                    (None, Some(path)) => DataSource::File(path),
                    (None, None) => anyhow::bail!("Either --content or --from-file is required"),
                },
            },
        };

        execute_control(&controller, action).await
    }
}
