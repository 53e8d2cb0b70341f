// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Load-balancer RPC surface.

use serde::{Deserialize, Serialize};

/// Settings handed to a worker at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerNetSettings {
    pub worker_id: u32,
    /// How often the worker must heartbeat.
    pub heartbeat_ms: u64,
    /// Peer-connection floor below which the worker tops up via
    /// `GetNodes`; also the replication ack quorum.
    pub min_peer_connections: usize,
}

/// Requests accepted by the load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LbRequest {
    /// Join the cluster with both listener addresses.
    RegisterNewWorker { rpc_addr: String, http_addr: String },

    /// Route a browser client to a worker for `session_id`.
    RegisterNewClient { session_id: String },

    /// Peer rpc addresses for replication, excluding the caller.
    GetNodes { worker_id: u32 },

    /// Liveness report carrying the worker's current client count.
    HeartBeat { worker_id: u32, num_clients: usize },

    /// Dispatch a submitted job and broadcast its finished log.
    NewJob { job_id: String, origin_worker_id: u32 },
}

/// Responses from the load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LbResponse {
    Settings { settings: WorkerNetSettings },

    /// Http address of the routed worker; `None` when no worker is
    /// available.
    WorkerAddr { http_addr: Option<String> },

    Nodes { addrs: Vec<String> },

    Ok,

    Error { message: String },
}
