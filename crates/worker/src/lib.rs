// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! golab-worker: the node browsers actually talk to.
//!
//! A worker holds sessions in memory, applies CRDT edits from its
//! WebSocket clients, replicates them to peer workers in acknowledged
//! chunks, writes through to the FS server, and executes snippets on
//! behalf of the load balancer.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod clients;
pub mod env;
pub mod http;
mod jobs;
mod replicate;
mod rpc;
pub mod runner;
mod sessions;
mod state;

pub use clients::{ClientHub, ClientMessage, ServerMessage};
pub use http::router;
pub use replicate::CHUNK_SIZE;
pub use runner::{output_from, FakeRunner, GoRunner, RunOutcome, SnippetRunner};
pub use state::{PendingElement, Worker, WorkerError, TIME_BUFFER};
