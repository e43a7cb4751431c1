// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! donky-relay: WebSocket development backend for the Donky SDK.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use donky_core::ServerNotification;
use donky_relay::{server, ServerState, DEFAULT_BATCH_LIMIT};

/// donky-relay: Donky development backend
#[derive(Parser, Debug)]
#[command(name = "donky-relay")]
#[command(about = "WebSocket development backend for the Donky SDK")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1:7890")]
    bind: SocketAddr,

    /// Maximum server notifications returned per round
    #[arg(long, default_value_t = DEFAULT_BATCH_LIMIT)]
    batch_limit: usize,

    /// JSON file with an array of server notifications to queue at startup
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting donky-relay");
    info!("  Bind address: {}", args.bind);
    info!("  Batch limit: {}", args.batch_limit);

    let state = ServerState::new(args.batch_limit);
    if let Some(path) = &args.seed {
        let seeded = load_seed(path)?;
        info!("  Seeded {} notifications from {}", seeded.len(), path.display());
        for notification in seeded {
            state.enqueue(notification).await;
        }
    }

    server::run(args.bind, state).await
}

fn load_seed(path: &Path) -> Result<Vec<ServerNotification>, Box<dyn std::error::Error + Send + Sync>> {
    let text = std::fs::read_to_string(path)?;
    let values: Vec<Value> = serde_json::from_str(&text)?;
    let notifications = values
        .into_iter()
        .map(ServerNotification::decode)
        .collect::<donky_core::Result<Vec<_>>>()?;
    Ok(notifications)
}
