// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FS server: storage-node membership, replication fan-out, read
//! failover, and the session→log index.
//!
//! Writes are fire-and-forget: the caller is answered as soon as the
//! per-node replication tasks have been spawned. Reads walk the replica
//! set of the requested object and return the first copy a live node
//! produces, evicting nodes that fail along the way. No lock is ever
//! held across a node RPC call; fan-outs and reads work on snapshots
//! taken under the lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use golab_core::{Clock, Log, Session, SystemClock};
use golab_wire::fs::{FsRequest, FsResponse};
use golab_wire::node::{NodeRequest, NodeResponse};
use golab_wire::{serve, RpcClient};
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// A node whose last heartbeat is older than this is excluded from
/// fan-outs and reads.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(2000);

const NODE_ID_LEN: usize = 16;

struct NodeRecord {
    addr: String,
    client: Arc<RpcClient>,
    /// Epoch ms of the last heartbeat. Atomic so the hot path never
    /// takes the table write lock.
    last_heartbeat_ms: AtomicU64,
}

/// The FS service object, one per process.
pub struct FsServer<C: Clock = SystemClock> {
    clock: C,
    nodes: RwLock<HashMap<String, NodeRecord>>,
    /// Session id → nodes known to hold a valid copy.
    sessions: RwLock<HashMap<String, HashSet<String>>>,
    /// Job id → nodes known to hold a valid copy.
    logs: RwLock<HashMap<String, HashSet<String>>>,
    /// Session id → job ids submitted against it.
    log_index: RwLock<HashMap<String, HashSet<String>>>,
}

impl FsServer<SystemClock> {
    pub fn new() -> Arc<Self> {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> FsServer<C> {
    pub fn with_clock(clock: C) -> Arc<Self> {
        Arc::new(FsServer {
            clock,
            nodes: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            logs: RwLock::new(HashMap::new()),
            log_index: RwLock::new(HashMap::new()),
        })
    }

    /// Serve the RPC surface on `listener` until the process exits.
    pub fn spawn(self: &Arc<Self>, listener: TcpListener) -> tokio::task::JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(serve(listener, server, Self::handle))
    }

    /// Dispatch one request.
    pub async fn handle(server: Arc<Self>, request: FsRequest) -> FsResponse {
        match request {
            FsRequest::RegisterNode { node_id, node_addr } => {
                server.register_node(node_id, node_addr).await
            }
            FsRequest::Heartbeat { node_id } => {
                server.heartbeat(&node_id);
                FsResponse::Ok
            }
            FsRequest::SaveSession { session } => {
                server.save_session(session);
                FsResponse::Started
            }
            FsRequest::GetSession { session_id } => match server.get_session(&session_id).await {
                Some((session, logs)) => FsResponse::Session { session: Some(session), logs },
                None => FsResponse::Session { session: None, logs: Vec::new() },
            },
            FsRequest::SaveLog { log } => {
                server.save_log(log);
                FsResponse::Started
            }
            FsRequest::GetLog { job_id } => FsResponse::Log { log: server.get_log(&job_id).await },
        }
    }

    /// Membership. An empty id mints a fresh one; a known id rejoins; an
    /// unknown id is rejected so the node re-registers fresh.
    pub async fn register_node(&self, node_id: String, node_addr: String) -> FsResponse {
        if node_id.is_empty() {
            let fresh = self.mint_node_id();
            // Dial the node back before installing it; registration of an
            // unreachable node is useless.
            let client = match RpcClient::connect(&node_addr).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(%node_addr, error = %e, "could not dial back registering node");
                    return FsResponse::Error { message: format!("dial back failed: {e}") };
                }
            };
            self.nodes.write().insert(
                fresh.clone(),
                NodeRecord {
                    addr: node_addr,
                    client: Arc::new(client),
                    last_heartbeat_ms: AtomicU64::new(self.clock.epoch_ms()),
                },
            );
            info!(node_id = %fresh, "new node registered");
            FsResponse::Registered { accepted: true, node_id: Some(fresh) }
        } else {
            if !self.nodes.read().contains_key(&node_id) {
                warn!(%node_id, "unknown node id rejected");
                return FsResponse::Registered { accepted: false, node_id: None };
            }
            let client = match RpcClient::connect(&node_addr).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(%node_addr, error = %e, "could not dial back returning node");
                    return FsResponse::Error { message: format!("dial back failed: {e}") };
                }
            };
            if let Some(record) = self.nodes.write().get_mut(&node_id) {
                record.addr = node_addr;
                record.client = Arc::new(client);
                record.last_heartbeat_ms.store(self.clock.epoch_ms(), Ordering::Relaxed);
            }
            info!(%node_id, "existing node registered");
            FsResponse::Registered { accepted: true, node_id: None }
        }
    }

    /// Refresh a node's liveness stamp. Unknown ids are ignored.
    pub fn heartbeat(&self, node_id: &str) {
        if let Some(record) = self.nodes.read().get(node_id) {
            record.last_heartbeat_ms.store(self.clock.epoch_ms(), Ordering::Relaxed);
        }
    }

    /// Fan a session out to every live node; fire-and-forget.
    pub fn save_session(self: &Arc<Self>, session: Session) {
        self.prune_dead_replicas(&self.sessions, &session.id);
        for (node_id, client) in self.live_nodes() {
            let server = Arc::clone(self);
            let session = session.clone();
            tokio::spawn(async move {
                server.save_session_to_node(session, node_id, client).await;
            });
        }
    }

    /// Fan a log out to every live node and index it under its session.
    pub fn save_log(self: &Arc<Self>, log: Log) {
        self.prune_dead_replicas(&self.logs, &log.job.job_id);
        self.log_index
            .write()
            .entry(log.job.session_id.clone())
            .or_default()
            .insert(log.job.job_id.clone());
        for (node_id, client) in self.live_nodes() {
            let server = Arc::clone(self);
            let log = log.clone();
            tokio::spawn(async move {
                server.save_log_to_node(log, node_id, client).await;
            });
        }
    }

    /// First live replica wins; failed replicas drop out of the set. A
    /// hit is returned together with every log indexed for the session.
    pub async fn get_session(&self, session_id: &str) -> Option<(Session, Vec<Log>)> {
        for (node_id, client) in self.replica_candidates(&self.sessions, session_id) {
            let request = NodeRequest::GetSession { session_id: session_id.to_string() };
            match client.call::<_, NodeResponse>(&request).await {
                Ok(NodeResponse::Session { session: Some(session) }) => {
                    let logs = self.logs_for(session_id).await;
                    return Some((session, logs));
                }
                _ => {
                    warn!(%session_id, %node_id, "session read failed, evicting replica");
                    self.evict_replica(&self.sessions, session_id, &node_id);
                }
            }
        }
        None
    }

    pub async fn get_log(&self, job_id: &str) -> Option<Log> {
        for (node_id, client) in self.replica_candidates(&self.logs, job_id) {
            let request = NodeRequest::GetLog { job_id: job_id.to_string() };
            match client.call::<_, NodeResponse>(&request).await {
                Ok(NodeResponse::Log { log: Some(log) }) => return Some(log),
                _ => {
                    warn!(%job_id, %node_id, "log read failed, evicting replica");
                    self.evict_replica(&self.logs, job_id, &node_id);
                }
            }
        }
        None
    }

    async fn logs_for(&self, session_id: &str) -> Vec<Log> {
        let job_ids: Vec<String> = self
            .log_index
            .read()
            .get(session_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        let mut logs = Vec::new();
        for job_id in job_ids {
            if let Some(log) = self.get_log(&job_id).await {
                logs.push(log);
            }
        }
        logs
    }

    async fn save_session_to_node(&self, session: Session, node_id: String, client: Arc<RpcClient>) {
        info!(session_id = %session.id, %node_id, "replicating session");
        let request = NodeRequest::SaveSession { session: session.clone() };
        match client.call::<_, NodeResponse>(&request).await {
            Ok(NodeResponse::Saved { ok: true }) => {
                self.sessions.write().entry(session.id).or_default().insert(node_id);
            }
            _ => {
                let addr = self.addr_of(&node_id);
                warn!(session_id = %session.id, %node_id, %addr, "session replication failed");
                self.evict_replica(&self.sessions, &session.id, &node_id);
            }
        }
    }

    async fn save_log_to_node(&self, log: Log, node_id: String, client: Arc<RpcClient>) {
        info!(job_id = %log.job.job_id, %node_id, "replicating log");
        let request = NodeRequest::SaveLog { log: log.clone() };
        match client.call::<_, NodeResponse>(&request).await {
            Ok(NodeResponse::Saved { ok: true }) => {
                self.logs.write().entry(log.job.job_id).or_default().insert(node_id);
            }
            _ => {
                let addr = self.addr_of(&node_id);
                warn!(job_id = %log.job.job_id, %node_id, %addr, "log replication failed");
                self.evict_replica(&self.logs, &log.job.job_id, &node_id);
            }
        }
    }

    /// Snapshot of live nodes: ids plus cloned client handles, taken
    /// under the read lock and released before any dialling.
    fn live_nodes(&self) -> Vec<(String, Arc<RpcClient>)> {
        let now = self.clock.epoch_ms();
        self.nodes
            .read()
            .iter()
            .filter(|(_, record)| is_live(record, now))
            .map(|(id, record)| (id.clone(), Arc::clone(&record.client)))
            .collect()
    }

    /// Live nodes recorded as holding `key`, in arbitrary order.
    fn replica_candidates(
        &self,
        replicas: &RwLock<HashMap<String, HashSet<String>>>,
        key: &str,
    ) -> Vec<(String, Arc<RpcClient>)> {
        let holders = replicas.read().get(key).cloned().unwrap_or_default();
        self.live_nodes().into_iter().filter(|(id, _)| holders.contains(id)).collect()
    }

    /// A previously cached copy on a dead node is stale; drop it from
    /// the replica set before fanning out.
    fn prune_dead_replicas(&self, replicas: &RwLock<HashMap<String, HashSet<String>>>, key: &str) {
        let now = self.clock.epoch_ms();
        let dead: Vec<String> = self
            .nodes
            .read()
            .iter()
            .filter(|(_, record)| !is_live(record, now))
            .map(|(id, _)| id.clone())
            .collect();
        if dead.is_empty() {
            return;
        }
        if let Some(set) = replicas.write().get_mut(key) {
            for node_id in &dead {
                set.remove(node_id);
            }
        }
    }

    fn evict_replica(
        &self,
        replicas: &RwLock<HashMap<String, HashSet<String>>>,
        key: &str,
        node_id: &str,
    ) {
        if let Some(set) = replicas.write().get_mut(key) {
            set.remove(node_id);
        }
    }

    fn addr_of(&self, node_id: &str) -> String {
        self.nodes.read().get(node_id).map(|record| record.addr.clone()).unwrap_or_default()
    }

    fn mint_node_id(&self) -> String {
        const ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
        let alphabet: Vec<char> = ALPHABET.chars().collect();
        loop {
            let id = nanoid::nanoid!(NODE_ID_LEN, &alphabet);
            if !self.nodes.read().contains_key(&id) {
                return id;
            }
        }
    }
}

fn is_live(record: &NodeRecord, now_ms: u64) -> bool {
    now_ms.saturating_sub(record.last_heartbeat_ms.load(Ordering::Relaxed))
        <= HEARTBEAT_TIMEOUT.as_millis() as u64
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
