//! Structured logging setup
//!
//! Events are written to stderr, as text or as one JSON object per line, so
//! stdout stays reserved for command results.
//!
//! Environment:
//!
//! * `DOCKHAND_LOG` - filter directives, taking precedence over `RUST_LOG`
//! * `DOCKHAND_LOG_FORMAT` - `text` or `json` when no format is passed in
//! * `DOCKHAND_LOG_SPAN_EVENTS` - span lifecycle events, e.g. `new,close`

use anyhow::{anyhow, Result};
use std::io;
use std::sync::OnceLock;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const FILTER_ENV: &str = "DOCKHAND_LOG";
const FORMAT_ENV: &str = "DOCKHAND_LOG_FORMAT";
const SPAN_EVENTS_ENV: &str = "DOCKHAND_LOG_SPAN_EVENTS";

/// Output encoding for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Unrecognized names fall back to text
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }

    fn default_span_events(self) -> FmtSpan {
        match self {
            Self::Json => FmtSpan::NEW | FmtSpan::CLOSE,
            Self::Text => FmtSpan::NONE,
        }
    }
}

static INSTALLED: OnceLock<LogFormat> = OnceLock::new();

/// Install the global subscriber.
///
/// An explicit `format` wins over `DOCKHAND_LOG_FORMAT`. Only the first
/// successful call has an effect. Fails when `DOCKHAND_LOG` holds directives
/// that do not parse.
pub fn init(format: Option<&str>) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let format = match format {
        Some(name) => LogFormat::from_name(name),
        None => std::env::var(FORMAT_ENV)
            .map(|name| LogFormat::from_name(&name))
            .unwrap_or_default(),
    };
    let span_events = std::env::var(SPAN_EVENTS_ENV)
        .map(|raw| parse_span_events(&raw))
        .unwrap_or_else(|_| format.default_span_events());
    let filter = env_filter()?;

    let layer = fmt::layer()
        .with_target(true)
        .with_span_events(span_events)
        .with_writer(io::stderr);
    let layer = match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.boxed(),
    };

    match tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
    {
        Ok(()) => tracing::debug!(?format, "Log subscriber installed"),
        Err(e) => eprintln!("Log subscriber already installed elsewhere: {}", e),
    }
    let _ = INSTALLED.set(format);
    Ok(())
}

/// Whether [`init`] has completed
pub fn is_initialized() -> bool {
    INSTALLED.get().is_some()
}

fn env_filter() -> Result<EnvFilter> {
    match std::env::var(FILTER_ENV) {
        Ok(directives) => EnvFilter::try_new(&directives).map_err(|e| {
            anyhow!(
                "Invalid {} directives '{}': {}",
                FILTER_ENV,
                directives,
                e
            )
        }),
        Err(_) => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Comma or pipe separated event names; unknown names are ignored
fn parse_span_events(raw: &str) -> FmtSpan {
    raw.split([',', '|'])
        .map(|token| token.trim().to_ascii_lowercase())
        .fold(FmtSpan::NONE, |events, token| {
            events
                | match token.as_str() {
                    "new" => FmtSpan::NEW,
                    "close" => FmtSpan::CLOSE,
                    "enter" => FmtSpan::ENTER,
                    "exit" => FmtSpan::EXIT,
                    "active" => FmtSpan::ACTIVE,
                    "full" => FmtSpan::FULL,
                    _ => FmtSpan::NONE,
                }
        })
}
