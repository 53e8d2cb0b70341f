// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! golab-fs: the replicated file-system service.
//!
//! Two daemons live here: the storage node, an opaque blob server that
//! persists sessions and logs to disk, and the FS server, which tracks
//! live nodes via heartbeats, fans writes out to every live node, and
//! serves reads from any node that still holds a valid copy.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod blobs;
pub mod node;
pub mod server;

pub use blobs::{BlobError, BlobStore};
pub use node::{FsNode, FsNodeHandle};
pub use server::{FsServer, HEARTBEAT_TIMEOUT};
