// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage-node RPC surface (FS server → node).

use golab_core::{Log, Session};
use serde::{Deserialize, Serialize};

/// Requests the FS server issues against a storage node. Blobs are
/// keyed by the id carried inside them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeRequest {
    SaveSession { session: Session },
    GetSession { session_id: String },
    SaveLog { log: Log },
    GetLog { job_id: String },
}

/// Responses from a storage node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeResponse {
    Saved { ok: bool },
    Session { session: Option<Session> },
    Log { log: Option<Log> },
}
