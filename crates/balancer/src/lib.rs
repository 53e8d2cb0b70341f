// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! golab-balancer: the cluster's client-to-worker router, job
//! dispatcher, and worker-peer directory.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod server;

pub use server::{LbServer, HEARTBEAT_INTERVAL, MIN_NUM_WORKER_CONNECTIONS, NUM_WORKER_TO_RETURN};
