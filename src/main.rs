//! The main entry point for the ccmd CLI.

#![warn(missing_docs)]

use std::process::ExitCode;

use ccmd::cli::{self, Args};
use clap::Parser;

//================================================================================================
// Functions
//================================================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(cli::change_directory());
    let Args { log, .. } = args;

    let _guard = cli::init_global_subscriber(log);
    let config = config::Config::load();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl+C received, terminating...");
            ExitCode::SUCCESS
        }
        res = tokio::task::spawn_blocking(move || cli::run(args, config)) => {
            match res.map_err(anyhow::Error::from).and_then(|res| res) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    ccmd::fatal!(format!("{e:#}"));
                    ExitCode::FAILURE
                },
            }
        }
    }
}
