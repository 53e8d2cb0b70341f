// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `worker <lb-addr> <fs-addr>` — a GoLab collaboration worker.

use clap::Parser;
use golab_worker::Worker;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "worker", about = "GoLab collaboration worker")]
struct Args {
    /// Load balancer address (host:port).
    lb_addr: String,

    /// FS server address (host:port).
    fs_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let worker = Worker::start(&args.lb_addr, &args.fs_addr).await?;
    tracing::info!(
        worker_id = worker.worker_id(),
        rpc_addr = worker.rpc_addr(),
        http_addr = worker.http_addr(),
        "worker running"
    );

    std::future::pending::<()>().await;
    Ok(())
}
