// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "quarry",
    about = "LLM application server: ReAct agent, agentic memory, hybrid retrieval, sandboxed code eval",
    version
)]
pub struct Cli {
    /// Explicit config file (merged over the discovered layers).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Log to stderr at debug level (RUST_LOG still overrides).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (the default when no subcommand is given).
    Serve {
        /// Listen address override, e.g. 127.0.0.1:3000.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Print the effective merged configuration and exit.
    ShowConfig,
}
