// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FS storage node daemon.
//!
//! An opaque blob server: it persists whatever sessions and logs the FS
//! server hands it and reports liveness through periodic heartbeats. On
//! registration it offers the id remembered from its last run; the
//! server either re-accepts it or assigns a fresh one, which the node
//! persists for next time.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use golab_wire::fs::{FsRequest, FsResponse};
use golab_wire::node::{NodeRequest, NodeResponse};
use golab_wire::{serve, ProtocolError, RpcClient};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::blobs::{BlobError, BlobStore};

/// Heartbeat period: the server's liveness window minus a buffer.
const HEARTBEAT_PERIOD: Duration = Duration::from_millis(1500);

/// Errors from node startup.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("rpc error: {0}")]
    Rpc(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registration rejected")]
    Rejected,

    #[error("unexpected response from server")]
    UnexpectedResponse,
}

/// One storage node's serving state.
pub struct FsNode {
    store: BlobStore,
}

/// Identity of a started node.
pub struct FsNodeHandle {
    pub node_id: String,
    pub addr: String,
}

impl FsNode {
    /// Boot a storage node: bind an ephemeral listener, register with
    /// the FS server, persist a newly assigned id, then serve blobs and
    /// heartbeat until the process exits.
    pub async fn start(fs_addr: &str, base_dir: &Path) -> Result<FsNodeHandle, NodeError> {
        let store = BlobStore::open(base_dir)?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();

        let server = RpcClient::connect(fs_addr).await?;
        let remembered = store.node_id().unwrap_or_default();
        let node_id = register(&server, &store, remembered, &addr).await?;
        info!(%node_id, %addr, "storage node registered");

        let node = Arc::new(FsNode { store });
        tokio::spawn(serve(listener, node, Self::handle));

        let heartbeat_id = node_id.clone();
        tokio::spawn(async move {
            loop {
                let request = FsRequest::Heartbeat { node_id: heartbeat_id.clone() };
                if let Err(e) = server.call::<_, FsResponse>(&request).await {
                    warn!(error = %e, "heartbeat failed");
                }
                tokio::time::sleep(HEARTBEAT_PERIOD).await;
            }
        });

        Ok(FsNodeHandle { node_id, addr })
    }

    /// Dispatch one blob request.
    pub async fn handle(node: Arc<Self>, request: NodeRequest) -> NodeResponse {
        match request {
            NodeRequest::SaveSession { session } => {
                info!(session_id = %session.id, "saving session blob");
                let ok = match node.store.save_session(&session) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(session_id = %session.id, error = %e, "session save failed");
                        false
                    }
                };
                NodeResponse::Saved { ok }
            }
            NodeRequest::GetSession { session_id } => {
                let session = node.store.get_session(&session_id).unwrap_or_else(|e| {
                    warn!(%session_id, error = %e, "session read failed");
                    None
                });
                NodeResponse::Session { session }
            }
            NodeRequest::SaveLog { log } => {
                info!(job_id = %log.job.job_id, "saving log blob");
                let ok = match node.store.save_log(&log) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(job_id = %log.job.job_id, error = %e, "log save failed");
                        false
                    }
                };
                NodeResponse::Saved { ok }
            }
            NodeRequest::GetLog { job_id } => {
                let log = node.store.get_log(&job_id).unwrap_or_else(|e| {
                    warn!(%job_id, error = %e, "log read failed");
                    None
                });
                NodeResponse::Log { log }
            }
        }
    }
}

/// Register with the server. A remembered id the server no longer knows
/// is retired and the node re-registers fresh.
async fn register(
    server: &RpcClient,
    store: &BlobStore,
    remembered: String,
    addr: &str,
) -> Result<String, NodeError> {
    let request =
        FsRequest::RegisterNode { node_id: remembered.clone(), node_addr: addr.to_string() };
    match server.call::<_, FsResponse>(&request).await? {
        FsResponse::Registered { accepted: true, node_id: Some(fresh) } => {
            store.store_node_id(&fresh)?;
            Ok(fresh)
        }
        FsResponse::Registered { accepted: true, node_id: None } => Ok(remembered),
        FsResponse::Registered { accepted: false, .. } if !remembered.is_empty() => {
            let request =
                FsRequest::RegisterNode { node_id: String::new(), node_addr: addr.to_string() };
            match server.call::<_, FsResponse>(&request).await? {
                FsResponse::Registered { accepted: true, node_id: Some(fresh) } => {
                    store.store_node_id(&fresh)?;
                    Ok(fresh)
                }
                _ => Err(NodeError::Rejected),
            }
        }
        FsResponse::Registered { .. } => Err(NodeError::Rejected),
        _ => Err(NodeError::UnexpectedResponse),
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
