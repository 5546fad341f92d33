// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(quarry_config::load(cli.config.as_deref())?);

    match cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&*config).unwrap_or_default());
            Ok(())
        }
        Some(Commands::Serve { listen }) => serve(config, listen).await,
        None => serve(config, None).await,
    }
}

async fn serve(
    config: Arc<quarry_config::Config>,
    listen_override: Option<String>,
) -> anyhow::Result<()> {
    let pool_size = config.database.effective_pool_size();
    info!(
        url = %config.database.url,
        pool_size,
        "connecting to vector database"
    );
    let pool = quarry_store::connect(&config.database.url, pool_size)
        .await
        .context("connecting to the vector database")?;
    quarry_store::ensure_schema(&pool, config.embedding.dimensions)
        .await
        .context("ensuring vector store schema")?;

    let listen = listen_override.unwrap_or_else(|| config.server.listen.clone());
    let state = quarry_server::AppState::build(config, pool).await;
    quarry_server::serve(state, &listen).await
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();
}
