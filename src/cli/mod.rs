//! CLI for the content pipeline
//!
//! One subcommand: `serve`, which runs the HTTP API plus the background
//! cache-maintenance and (optionally) interval-driven sync tasks.

pub mod serve;

use clap::{Parser, Subcommand};

/// Content sync pipeline - keeps per-domain knowledge bases fresh and
/// serves ranked context
#[derive(Parser)]
#[command(name = "portal-content-pipeline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the API server with background maintenance tasks
    Serve,
}
