// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fs-server <port>` — the FS replication coordinator.

use anyhow::Context as _;
use clap::Parser;
use golab_fs::FsServer;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fs-server", about = "GoLab replicated file-system server")]
struct Args {
    /// TCP port to listen on.
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(("127.0.0.1", args.port))
        .await
        .with_context(|| format!("bind port {}", args.port))?;
    tracing::info!(addr = %listener.local_addr()?, "fs server listening");

    let server = FsServer::new();
    server.spawn(listener).await?;
    Ok(())
}
