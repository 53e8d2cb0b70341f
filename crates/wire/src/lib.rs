// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol for the GoLab cluster.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, over
//! persistent TCP connections. Every RPC surface is a tagged enum with
//! one nominal struct variant per call — no positional payloads.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod balancer;
mod client;
mod frame;
pub mod fs;
pub mod node;
pub mod peer;
mod server;

pub use client::{rpc_timeout, RpcClient};
pub use frame::{
    decode, encode, read_message, read_value, write_message, write_value, ProtocolError,
    MAX_FRAME_LEN,
};
pub use server::serve;
