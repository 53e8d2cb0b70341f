// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load balancer: worker membership with two-strike eviction, sticky
//! least-loaded client routing, job dispatch with failover, and log
//! broadcast.
//!
//! Every walk over the worker table runs on a snapshot taken under the
//! lock; dialling happens with the lock released. A single failed
//! worker in any walk is skipped, never fatal.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use golab_core::{Clock, Log, SystemClock};
use golab_wire::balancer::{LbRequest, LbResponse, WorkerNetSettings};
use golab_wire::peer::{PeerRequest, PeerResponse};
use golab_wire::{serve, ProtocolError, RpcClient};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Heartbeat cadence required of workers; also the monitor period.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);

/// Peer-connection floor handed to workers at registration.
pub const MIN_NUM_WORKER_CONNECTIONS: usize = 2;

/// Cap on the peer set returned by `GetNodes`.
pub const NUM_WORKER_TO_RETURN: usize = 4;

#[derive(Debug, Clone)]
struct WorkerRecord {
    worker_id: u32,
    rpc_addr: String,
    http_addr: String,
    recent_heartbeat_ms: u64,
    num_clients: usize,
    strikes: u32,
}

/// The load-balancer service object, one per process.
pub struct LbServer<C: Clock = SystemClock> {
    clock: C,
    workers: RwLock<HashMap<u32, WorkerRecord>>,
    session_ids: RwLock<HashSet<String>>,
    next_worker_id: AtomicU32,
}

impl LbServer<SystemClock> {
    pub fn new() -> Arc<Self> {
        Self::with_clock(SystemClock)
    }
}

impl<C: Clock> LbServer<C> {
    pub fn with_clock(clock: C) -> Arc<Self> {
        Arc::new(LbServer {
            clock,
            workers: RwLock::new(HashMap::new()),
            session_ids: RwLock::new(HashSet::new()),
            next_worker_id: AtomicU32::new(0),
        })
    }

    /// Serve the RPC surface on `listener` until the process exits.
    pub fn spawn(self: &Arc<Self>, listener: TcpListener) -> tokio::task::JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(serve(listener, server, Self::handle))
    }

    /// Dispatch one request.
    pub async fn handle(server: Arc<Self>, request: LbRequest) -> LbResponse {
        match request {
            LbRequest::RegisterNewWorker { rpc_addr, http_addr } => {
                server.register_new_worker(rpc_addr, http_addr)
            }
            LbRequest::RegisterNewClient { session_id } => {
                server.register_new_client(session_id).await
            }
            LbRequest::GetNodes { worker_id } => server.get_nodes(worker_id),
            LbRequest::HeartBeat { worker_id, num_clients } => {
                server.heartbeat(worker_id, num_clients)
            }
            LbRequest::NewJob { job_id, origin_worker_id } => {
                server.new_job(job_id, origin_worker_id).await
            }
        }
    }

    /// Admit a worker and start its monitor. A second worker on the
    /// same rpc address is rejected.
    pub fn register_new_worker(self: &Arc<Self>, rpc_addr: String, http_addr: String) -> LbResponse {
        {
            let mut workers = self.workers.write();
            if workers.values().any(|w| w.rpc_addr == rpc_addr) {
                return LbResponse::Error {
                    message: format!("address already registered [{rpc_addr}]"),
                };
            }
            let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            workers.insert(
                worker_id,
                WorkerRecord {
                    worker_id,
                    rpc_addr: rpc_addr.clone(),
                    http_addr,
                    recent_heartbeat_ms: self.clock.epoch_ms(),
                    num_clients: 0,
                    strikes: 0,
                },
            );
            info!(worker_id, %rpc_addr, "worker registered");
            self.spawn_monitor(worker_id);
            LbResponse::Settings {
                settings: WorkerNetSettings {
                    worker_id,
                    heartbeat_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
                    min_peer_connections: MIN_NUM_WORKER_CONNECTIONS,
                },
            }
        }
    }

    /// Record a heartbeat: refresh the stamp, store the load, clear
    /// strikes.
    pub fn heartbeat(&self, worker_id: u32, num_clients: usize) -> LbResponse {
        let mut workers = self.workers.write();
        match workers.get_mut(&worker_id) {
            Some(worker) => {
                worker.recent_heartbeat_ms = self.clock.epoch_ms();
                worker.num_clients = num_clients;
                worker.strikes = 0;
                LbResponse::Ok
            }
            None => LbResponse::Error { message: "unknown worker".to_string() },
        }
    }

    /// One monitor pass for `worker_id`. Returns `false` once the
    /// worker is gone. A first missed window is absorbed as a strike;
    /// the second consecutive miss evicts.
    pub fn check_worker(&self, worker_id: u32) -> bool {
        let mut workers = self.workers.write();
        let Some(worker) = workers.get_mut(&worker_id) else {
            return false;
        };
        let now = self.clock.epoch_ms();
        if now.saturating_sub(worker.recent_heartbeat_ms) > HEARTBEAT_INTERVAL.as_millis() as u64 {
            if worker.strikes >= 1 {
                let rpc_addr = worker.rpc_addr.clone();
                workers.remove(&worker_id);
                info!(worker_id, %rpc_addr, "worker timed out");
                return false;
            }
            worker.strikes += 1;
            warn!(worker_id, "worker missed a heartbeat window");
        }
        true
    }

    /// Route a browser client: walk workers least-loaded first, place
    /// the session on the first one that answers, and return its http
    /// address. Empty when no worker is available.
    pub async fn register_new_client(&self, session_id: String) -> LbResponse {
        let candidates = self.workers_by_load();
        if candidates.is_empty() {
            return LbResponse::WorkerAddr { http_addr: None };
        }
        let known_session = self.session_ids.read().contains(&session_id);
        for candidate in candidates {
            // Optimistic: count the client before the dial settles; the
            // worker's next heartbeat corrects the number.
            if let Some(worker) = self.workers.write().get_mut(&candidate.worker_id) {
                worker.num_clients += 1;
            }
            let request = if known_session {
                PeerRequest::LoadSession { session_id: session_id.clone() }
            } else {
                PeerRequest::CreateNewSession { session_id: session_id.clone() }
            };
            match call_worker(&candidate.rpc_addr, &request).await {
                Ok(PeerResponse::Ok) => {
                    self.session_ids.write().insert(session_id.clone());
                    info!(worker_id = candidate.worker_id, %session_id, "client routed");
                    return LbResponse::WorkerAddr { http_addr: Some(candidate.http_addr) };
                }
                Ok(other) => {
                    warn!(worker_id = candidate.worker_id, response = ?other, "session placement refused");
                }
                Err(e) => {
                    warn!(worker_id = candidate.worker_id, error = %e, "worker unreachable during routing");
                }
            }
        }
        LbResponse::WorkerAddr { http_addr: None }
    }

    /// Peer rpc addresses for `worker_id`, excluding itself, under a
    /// deterministic shuffle so its peer set stays stable across calls.
    pub fn get_nodes(&self, worker_id: u32) -> LbResponse {
        let mut addrs: Vec<String> = {
            let workers = self.workers.read();
            if !workers.contains_key(&worker_id) {
                return LbResponse::Error { message: "unknown worker".to_string() };
            }
            workers
                .values()
                .filter(|w| w.worker_id != worker_id)
                .map(|w| w.rpc_addr.clone())
                .collect()
        };
        addrs.sort();
        let mut rng = StdRng::seed_from_u64(u64::from(worker_id % 32));
        addrs.shuffle(&mut rng);
        addrs.truncate(NUM_WORKER_TO_RETURN);
        LbResponse::Nodes { addrs }
    }

    /// Run `job_id` on the least-loaded worker that accepts it, then
    /// broadcast the finished log to every worker (the origin included)
    /// for client delivery. Quiet when no worker succeeds.
    pub async fn new_job(&self, job_id: String, origin_worker_id: u32) -> LbResponse {
        let candidates = self.workers_by_load();
        let mut finished: Option<Log> = None;
        for candidate in &candidates {
            let request = PeerRequest::RunJob { job_id: job_id.clone() };
            match call_worker(&candidate.rpc_addr, &request).await {
                Ok(PeerResponse::Log { log: Some(log) }) => {
                    info!(worker_id = candidate.worker_id, %job_id, "job executed");
                    finished = Some(log);
                    break;
                }
                Ok(_) => warn!(worker_id = candidate.worker_id, %job_id, "worker could not run job"),
                Err(e) => {
                    warn!(worker_id = candidate.worker_id, error = %e, "worker unreachable during dispatch");
                }
            }
        }
        let Some(log) = finished else {
            warn!(%job_id, origin_worker_id, "no worker could run job");
            return LbResponse::Ok;
        };

        let all: Vec<WorkerRecord> = self.workers.read().values().cloned().collect();
        for worker in all {
            let request = PeerRequest::SendLog { log: log.clone() };
            if let Err(e) = call_worker(&worker.rpc_addr, &request).await {
                warn!(worker_id = worker.worker_id, error = %e, "log broadcast failed");
            }
        }
        LbResponse::Ok
    }

    fn spawn_monitor(self: &Arc<Self>, worker_id: u32) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                if !server.check_worker(worker_id) {
                    return;
                }
            }
        });
    }

    /// Snapshot sorted ascending by load, worker id as tie break.
    fn workers_by_load(&self) -> Vec<WorkerRecord> {
        let mut list: Vec<WorkerRecord> = self.workers.read().values().cloned().collect();
        list.sort_by_key(|w| (w.num_clients, w.worker_id));
        list
    }
}

async fn call_worker(addr: &str, request: &PeerRequest) -> Result<PeerResponse, ProtocolError> {
    let client = RpcClient::connect(addr).await?;
    client.call(request).await
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
