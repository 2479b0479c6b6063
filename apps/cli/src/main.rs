//! Guardian command line for auditing and managing cluster access control.

#![forbid(unsafe_code)]

mod cli_args;
mod commands;
mod config;
mod output;
mod services;

use std::process::ExitCode;

use clap::Parser;
use guardian_core::AppResult;

use crate::cli_args::Cli;
use crate::config::{GuardianConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> AppResult<bool> {
    let config = GuardianConfig::load()?;
    init_tracing();

    let services = services::build_services(&config, cli.allow_writes).await?;
    commands::run(&services, cli.command).await
}
