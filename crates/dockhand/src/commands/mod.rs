//! Command implementations
//!
//! `serve` runs the HTTP control API; every other subcommand performs one
//! lifecycle operation and prints its JSON result.

pub mod control;
pub mod serve;
