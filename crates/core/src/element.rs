// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-character CRDT elements and their id convention.

use serde::{Deserialize, Serialize};

/// Sentinel prev id used to insert at the head of a session.
///
/// Characters are always added to the right of an anchor, so the first
/// character of an empty document anchors on this fake id.
pub const INITIAL_ID: &str = "12345";

/// One character position in a session.
///
/// `prev_id`/`next_id` are string keys into the session's element map,
/// never direct references. The indirection keeps elements serializable
/// and gives them the same identity on every worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub session_id: String,
    /// Id of the worker that minted this element.
    pub client_id: String,
    pub id: String,
    pub prev_id: String,
    pub next_id: String,
    pub text: String,
    pub deleted: bool,
    /// Wall-clock seconds at mint time. Informational only.
    pub timestamp: u64,
}

/// Build an element id from a session-local counter and the minting
/// worker's id: `decimal(next) ++ decimal(worker_id)`.
///
/// Distinct workers never mint the same id (distinct suffixes) and a
/// single worker never reuses one (monotone counter). Two ids racing
/// for the same insertion point order by lexicographic comparison of
/// the id strings.
pub fn element_id(next: u64, worker_id: u32) -> String {
    format!("{next}{worker_id}")
}
