// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sequence CRDT for one collaborative session.
//!
//! A session is a doubly-linked list of single-character elements,
//! addressed by id through the element map. Concurrent inserts at the
//! same anchor are ordered by lexicographic comparison of the new ids,
//! which makes application order irrelevant: any two replicas that have
//! applied the same multiset of elements traverse identically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{element_id, Element, INITIAL_ID};

/// A shared collaborative document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub elements: HashMap<String, Element>,
    /// Id of the first element in traversal order, if any.
    pub head: Option<String>,
    /// Counter seeding locally minted element ids.
    pub next: u64,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Session { id: id.into(), elements: HashMap::new(), head: None, next: 1 }
    }

    /// Mint a locally originated element anchored after `prev_id` and
    /// bump the counter that seeds local ids. The element still has to
    /// be applied via [`Session::add`].
    pub fn mint(&mut self, worker_id: u32, prev_id: &str, text: &str, timestamp: u64) -> Element {
        let id = element_id(self.next, worker_id);
        self.next += 1;
        Element {
            session_id: self.id.clone(),
            client_id: worker_id.to_string(),
            id,
            prev_id: prev_id.to_string(),
            next_id: String::new(),
            text: text.to_string(),
            deleted: false,
            timestamp,
        }
    }

    /// Splice `element` into the list. Total and idempotent: a duplicate
    /// id or an unknown anchor returns `false` and leaves the session
    /// unchanged.
    pub fn add(&mut self, element: Element) -> bool {
        if self.elements.contains_key(&element.id) {
            return false;
        }
        if !is_head_insert(&element.prev_id) && !self.elements.contains_key(&element.prev_id) {
            return false;
        }
        self.insert(element);
        true
    }

    /// Tombstone the element with `id`. Returns `false` when the id is
    /// absent or already deleted; deletion is monotone.
    pub fn delete(&mut self, id: &str) -> bool {
        match self.elements.get_mut(id) {
            Some(element) if !element.deleted => {
                element.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Apply an element received from a peer: a tombstoned element is a
    /// delete of its id, anything else is an insert.
    pub fn apply(&mut self, element: Element) -> bool {
        if element.deleted {
            self.delete(&element.id)
        } else {
            self.add(element)
        }
    }

    /// Traverse the list from the head, tombstones included.
    pub fn iter(&self) -> Traverse<'_> {
        Traverse { session: self, cursor: self.head.clone() }
    }

    /// Render the visible document text.
    pub fn text(&self) -> String {
        self.iter().filter(|e| !e.deleted).map(|e| e.text.as_str()).collect()
    }

    fn insert(&mut self, mut element: Element) {
        let id = element.id.clone();
        // Pointers carried over from the sender's copy are meaningless
        // here; both are rewritten against the local list.
        element.next_id = String::new();
        if is_head_insert(&element.prev_id) {
            // The new element replaces the head; the old head (if any)
            // becomes its right neighbour.
            if let Some(old_head) = self.head.take() {
                if let Some(head) = self.elements.get_mut(&old_head) {
                    head.prev_id = id.clone();
                }
                element.next_id = old_head;
            }
            element.prev_id = INITIAL_ID.to_string();
            self.head = Some(id.clone());
        } else {
            let anchor_id = self.anchor_for(&element);
            let anchor_next =
                self.elements.get(&anchor_id).map(|a| a.next_id.clone()).unwrap_or_default();
            if !anchor_next.is_empty() {
                if let Some(next) = self.elements.get_mut(&anchor_next) {
                    next.prev_id = id.clone();
                }
                element.next_id = anchor_next;
            }
            if let Some(anchor) = self.elements.get_mut(&anchor_id) {
                anchor.next_id = id.clone();
            }
            element.prev_id = anchor_id;
        }
        self.elements.insert(id, element);
    }

    /// Walk right from the requested anchor past concurrent inserts that
    /// sort before the incoming element. Runs from the same origin keep
    /// their local order, so the walk stops at the first element minted
    /// by the same worker.
    fn anchor_for(&self, element: &Element) -> String {
        let mut anchor_id = element.prev_id.clone();
        while let Some(anchor) = self.elements.get(&anchor_id) {
            if anchor.next_id.is_empty() {
                break;
            }
            match self.elements.get(&anchor.next_id) {
                Some(next) if next.id.as_str() > element.id.as_str()
                    && next.client_id != element.client_id =>
                {
                    anchor_id = next.id.clone();
                }
                _ => break,
            }
        }
        anchor_id
    }
}

fn is_head_insert(prev_id: &str) -> bool {
    prev_id.is_empty() || prev_id == INITIAL_ID
}

/// Iterator over a session's elements in document order.
pub struct Traverse<'a> {
    session: &'a Session,
    cursor: Option<String>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor.take()?;
        let element = self.session.elements.get(&id)?;
        if !element.next_id.is_empty() {
            self.cursor = Some(element.next_id.clone());
        }
        Some(element)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
