// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FS server RPC surface.

use golab_core::{Log, Session};
use serde::{Deserialize, Serialize};

/// Requests accepted by the FS server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FsRequest {
    /// Join or rejoin the replica set. `node_id` is empty for a fresh
    /// node; a non-empty id is accepted only if the server already
    /// knows it.
    RegisterNode { node_id: String, node_addr: String },

    Heartbeat { node_id: String },

    /// Fan a session out to every live node. Fire-and-forget: the
    /// response only acknowledges that replication has started.
    SaveSession { session: Session },

    GetSession { session_id: String },

    /// Fan a log out to every live node and index it under its session.
    SaveLog { log: Log },

    GetLog { job_id: String },
}

/// Responses from the FS server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FsResponse {
    Registered {
        accepted: bool,
        /// Newly minted id when the node registered fresh.
        node_id: Option<String>,
    },

    /// Replication fan-out has been started.
    Started,

    /// The session plus every log indexed under it, or `None` when no
    /// live replica holds it.
    Session { session: Option<Session>, logs: Vec<Log> },

    Log { log: Option<Log> },

    Ok,

    Error { message: String },
}
