// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrscan: find, decode, and classify QR codes embedded in PDF documents
//
// Entry point. Initialises logging and services, then dispatches the
// requested command.

mod cli;
mod commands;
mod services;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use services::app_services::ScanServices;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("qrscan starting");

    let services = match ScanServices::init() {
        Ok(services) => services,
        Err(err) => {
            tracing::error!(error = %err, "failed to initialise services");
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Command::Scan(args) => commands::scan(&services, args).await,
        Command::Results(args) => commands::results(&services, args).map(|()| true),
        Command::History(args) => commands::history(&services, args).map(|()| true),
        Command::Config(args) => commands::config(&services, args).map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}
