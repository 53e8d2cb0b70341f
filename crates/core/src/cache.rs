// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sliding window of recently seen elements, kept per session so a
//! reconnecting client can recover edits that raced its disconnect.
//!
//! Entries expire after [`EXPIRY_THRESHOLD`]; the owning daemon drives
//! expiry by calling [`ElementCache::sweep`] every
//! [`MAINTENANCE_INTERVAL`]. Sessions that are still being fetched from
//! peers or the file system are marked pending and are exempt from
//! eviction until the fetch settles.

use std::collections::HashMap;
use std::time::Duration;

use crate::element::Element;

/// How often the maintenance sweep runs.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(2);

/// Age at which a cached element is dropped: five sweep periods.
pub const EXPIRY_THRESHOLD: Duration = Duration::from_secs(10);

struct CachedElement {
    element: Element,
    cached_at_ms: u64,
}

/// Bounded per-session window of recent elements.
#[derive(Default)]
pub struct ElementCache {
    elements: HashMap<String, Vec<CachedElement>>,
    pending: HashMap<String, bool>,
}

impl ElementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an element, deduplicated on `(id, deleted)` so an insert
    /// and its later tombstone are cached as distinct entries.
    pub fn add(&mut self, element: Element, now_ms: u64) {
        let entries = self.elements.entry(element.session_id.clone()).or_default();
        let seen = entries
            .iter()
            .any(|c| c.element.id == element.id && c.element.deleted == element.deleted);
        if !seen {
            entries.push(CachedElement { element, cached_at_ms: now_ms });
        }
    }

    /// Elements currently cached for `session_id`, oldest first.
    pub fn get(&self, session_id: &str) -> Vec<Element> {
        self.elements
            .get(session_id)
            .map(|entries| entries.iter().map(|c| c.element.clone()).collect())
            .unwrap_or_default()
    }

    /// Suppress eviction for a session while it is being fetched.
    pub fn mark_pending(&mut self, session_id: &str) {
        self.pending.insert(session_id.to_string(), true);
    }

    pub fn clear_pending(&mut self, session_id: &str) {
        self.pending.insert(session_id.to_string(), false);
    }

    pub fn is_pending(&self, session_id: &str) -> bool {
        self.pending.get(session_id).copied().unwrap_or(false)
    }

    /// Drop entries older than [`EXPIRY_THRESHOLD`]. Pending sessions
    /// are skipped entirely.
    pub fn sweep(&mut self, now_ms: u64) {
        let expiry_ms = EXPIRY_THRESHOLD.as_millis() as u64;
        for (session_id, entries) in &mut self.elements {
            if self.pending.get(session_id).copied().unwrap_or(false) {
                continue;
            }
            entries.retain(|c| now_ms.saturating_sub(c.cached_at_ms) < expiry_ms);
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
