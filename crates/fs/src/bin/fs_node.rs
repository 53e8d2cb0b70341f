// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fs-node <fs-addr>` — one storage node of the replicated file system.

use std::path::PathBuf;

use clap::Parser;
use golab_fs::FsNode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fs-node", about = "GoLab file-system storage node")]
struct Args {
    /// FS server address (host:port).
    fs_addr: String,

    /// Directory holding this node's blobs and remembered id.
    #[arg(long, default_value = "./fs-data")]
    base_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let handle = FsNode::start(&args.fs_addr, &args.base_dir).await?;
    tracing::info!(node_id = %handle.node_id, addr = %handle.addr, "storage node running");

    std::future::pending::<()>().await;
    Ok(())
}
