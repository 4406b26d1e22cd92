//! Core library for the dockhand container controller
//!
//! This crate holds the container runtime adapter, the convergence poller, the
//! lifecycle operations for the single managed container, the HTTP control
//! surface, configuration, logging, and error handling.

pub mod api;
pub mod config;
pub mod docker;
pub mod errors;
pub mod lifecycle;
pub mod logging;
pub mod poll;
pub mod runtime;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
