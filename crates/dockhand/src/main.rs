use anyhow::Result;
use clap::Parser;
use dockhand_core::errors::DockhandError;

mod cli;
mod commands;
mod runtime_utils;

#[tokio::main]
async fn main() -> Result<()> {
    let parsed = cli::Cli::parse();

    match parsed.dispatch().await {
        Ok(()) => Ok(()),
        Err(err) => {
            // Exit code 3 when the container engine could not be reached
            if let Some(e @ DockhandError::RuntimeUnavailable { .. }) =
                err.downcast_ref::<DockhandError>()
            {
                eprintln!("Error: {}", e);
                std::process::exit(3);
            }

            Err(err)
        }
    }
}
