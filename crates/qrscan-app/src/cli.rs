// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// qrscan: find, decode, and classify QR codes embedded in PDF documents
#[derive(Debug, Parser)]
#[command(name = "qrscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan PDF files and print one record per embedded image
    Scan(ScanArgs),
    /// Print stored records for a previous scan
    Results(ResultsArgs),
    /// Summarise every scanned file, most recent first
    History(OutputArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// PDF files to scan
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Include each image as a data URI
    #[arg(long)]
    pub images: bool,

    /// Suppress progress output on stderr
    #[arg(short, long)]
    pub quiet: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ResultsArgs {
    /// Session id printed by `scan`
    pub session: String,

    /// Include each image as a data URI
    #[arg(long)]
    pub images: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Also write the effective configuration to config.json
    #[arg(long)]
    pub write: bool,
}
