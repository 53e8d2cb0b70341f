// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the worker crate.

use std::time::Duration;

/// Outbound replication tick period.
pub fn element_delay() -> Duration {
    std::env::var("GOLAB_ELEMENT_DELAY_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(1000))
}

/// Wall-clock budget for one snippet run.
pub fn snippet_timeout() -> Duration {
    std::env::var("GOLAB_SNIPPET_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Go toolchain binary used to run snippets.
pub fn go_bin() -> String {
    std::env::var("GOLAB_GO_BIN").unwrap_or_else(|_| "go".to_string())
}
