// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker service object and its long-lived tasks.
//!
//! One [`Worker`] per process, injected into the RPC and HTTP handlers.
//! Shared maps sit behind `parking_lot` locks; no lock is ever held
//! across an RPC await — fan-outs work on snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use golab_core::{Clock, Element, ElementCache, Log, Session, SystemClock, MAINTENANCE_INTERVAL};
use golab_wire::balancer::{LbRequest, LbResponse, WorkerNetSettings};
use golab_wire::{serve, ProtocolError, RpcClient};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::runner::{GoRunner, SnippetRunner};
use crate::{http, rpc};

/// Worker and FS-node heartbeats fire this much before the deadline.
pub const TIME_BUFFER: Duration = Duration::from_millis(500);

/// Errors from worker startup and edit application.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("rpc error: {0}")]
    Rpc(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registration rejected: {0}")]
    Registration(String),

    #[error("unexpected response from {0}")]
    UnexpectedResponse(&'static str),

    #[error("session {0} is not loaded")]
    SessionNotLoaded(String),

    #[error("invalid edit: {0}")]
    InvalidEdit(String),
}

/// A locally minted element waiting for replication confirmation, tied
/// to the browser user that produced it.
#[derive(Debug, Clone)]
pub struct PendingElement {
    pub element: Element,
    pub user_id: String,
}

/// The worker service object.
pub struct Worker<C: Clock = SystemClock> {
    pub(crate) settings: WorkerNetSettings,
    pub(crate) rpc_addr: String,
    pub(crate) http_addr: String,
    pub(crate) clock: C,
    pub(crate) runner: Arc<dyn SnippetRunner>,
    pub(crate) lb: RpcClient,
    pub(crate) fs: RpcClient,

    pub(crate) sessions: Mutex<HashMap<String, Session>>,
    pub(crate) logs: Mutex<HashMap<String, HashMap<String, Log>>>,
    /// Sessions with local edits not yet pushed to the FS server.
    pub(crate) modified: Mutex<HashSet<String>>,
    /// Local edits not yet sent to peers this tick.
    pub(crate) local_elements: Mutex<Vec<PendingElement>>,
    /// Sent edits awaiting the replication quorum.
    pub(crate) elements_to_ack: Mutex<Vec<PendingElement>>,
    pub(crate) cache: Mutex<ElementCache>,
    /// Peer rpc address → duplex client link.
    pub(crate) peers: Mutex<HashMap<String, Arc<RpcClient>>>,
    pub(crate) clients: crate::clients::ClientHub,
}

impl Worker<SystemClock> {
    /// Boot a production worker: register with the load balancer,
    /// connect to the FS server, and start every long-lived loop.
    pub async fn start(lb_addr: &str, fs_addr: &str) -> Result<Arc<Self>, WorkerError> {
        Self::start_with(lb_addr, fs_addr, SystemClock, Arc::new(GoRunner), true).await
    }
}

impl<C: Clock> Worker<C> {
    /// Boot with an injected clock, runner, and auto-save switch.
    pub async fn start_with(
        lb_addr: &str,
        fs_addr: &str,
        clock: C,
        runner: Arc<dyn SnippetRunner>,
        auto_save: bool,
    ) -> Result<Arc<Self>, WorkerError> {
        let rpc_listener = TcpListener::bind("127.0.0.1:0").await?;
        let rpc_addr = rpc_listener.local_addr()?.to_string();
        let http_listener = TcpListener::bind("127.0.0.1:0").await?;
        let http_addr = http_listener.local_addr()?.to_string();

        let lb = RpcClient::connect(lb_addr).await?;
        let register = LbRequest::RegisterNewWorker {
            rpc_addr: rpc_addr.clone(),
            http_addr: http_addr.clone(),
        };
        let settings = match lb.call::<_, LbResponse>(&register).await? {
            LbResponse::Settings { settings } => settings,
            LbResponse::Error { message } => return Err(WorkerError::Registration(message)),
            _ => return Err(WorkerError::UnexpectedResponse("load balancer")),
        };
        let fs = RpcClient::connect(fs_addr).await?;
        info!(worker_id = settings.worker_id, %rpc_addr, %http_addr, "worker registered");

        let worker = Arc::new(Worker {
            settings,
            rpc_addr,
            http_addr,
            clock,
            runner,
            lb,
            fs,
            sessions: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            modified: Mutex::new(HashSet::new()),
            local_elements: Mutex::new(Vec::new()),
            elements_to_ack: Mutex::new(Vec::new()),
            cache: Mutex::new(ElementCache::new()),
            peers: Mutex::new(HashMap::new()),
            clients: crate::clients::ClientHub::new(),
        });

        tokio::spawn(serve(rpc_listener, Arc::clone(&worker), rpc::handle));
        let router = http::router(Arc::clone(&worker));
        tokio::spawn(async move {
            if let Err(e) = axum::serve(http_listener, router).await {
                error!(error = %e, "http serve failed");
            }
        });

        worker.spawn_heartbeat();
        worker.spawn_replication(auto_save);
        worker.spawn_cache_maintenance();
        worker.get_peers().await;

        Ok(worker)
    }

    pub fn worker_id(&self) -> u32 {
        self.settings.worker_id
    }

    pub fn rpc_addr(&self) -> &str {
        &self.rpc_addr
    }

    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// The browser-client hub.
    pub fn hub(&self) -> &crate::clients::ClientHub {
        &self.clients
    }

    /// Snapshot of the peer table: addresses plus cloned client
    /// handles, safe to dial without holding the lock.
    pub(crate) fn peer_snapshot(&self) -> Vec<(String, Arc<RpcClient>)> {
        self.peers.lock().iter().map(|(addr, client)| (addr.clone(), Arc::clone(client))).collect()
    }

    fn spawn_heartbeat(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            let period =
                Duration::from_millis(worker.settings.heartbeat_ms).saturating_sub(TIME_BUFFER);
            loop {
                let request = LbRequest::HeartBeat {
                    worker_id: worker.settings.worker_id,
                    num_clients: worker.clients.num_clients(),
                };
                if let Err(e) = worker.lb.call::<_, LbResponse>(&request).await {
                    warn!(error = %e, "heartbeat failed");
                }
                tokio::time::sleep(period).await;
            }
        });
    }

    fn spawn_cache_maintenance(self: &Arc<Self>) {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(MAINTENANCE_INTERVAL).await;
                let now = worker.clock.epoch_ms();
                worker.cache.lock().sweep(now);
            }
        });
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
