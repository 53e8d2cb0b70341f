// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker peer-to-peer RPC surface.
//!
//! Also carries the calls the load balancer makes into workers
//! (session placement, job execution, log broadcast).

use std::collections::HashMap;

use golab_core::{Element, Log, Session};
use serde::{Deserialize, Serialize};

/// Requests accepted by a worker's RPC listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PeerRequest {
    PingWorker,

    /// Ask the callee to dial the caller back, completing a duplex
    /// replication link.
    BidirectionalSetup { rpc_addr: String },

    /// One chunk of a peer's outbound element queue.
    ApplyIncomingElements { elements: Vec<Element> },

    GetSession { session_id: String },

    CreateNewSession { session_id: String },

    LoadSession { session_id: String },

    /// Execute the job's snippet (or return the stored log when it has
    /// already run).
    RunJob { job_id: String },

    /// Broadcast of a finished log from the load balancer.
    SendLog { log: Log },
}

/// Responses from a worker's RPC listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum PeerResponse {
    Pong,

    Ok,

    /// The session and its logs, or `None` when this worker does not
    /// hold it.
    Session { session: Option<Session>, logs: HashMap<String, Log> },

    Log { log: Option<Log> },

    Error { message: String },
}
