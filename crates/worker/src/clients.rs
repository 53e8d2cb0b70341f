// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-client hub: WebSocket registry and message fan-out.
//!
//! Each connected user has an unbounded channel feeding its socket's
//! writer task; the hub is the only place that maps users to sessions.

use std::collections::HashMap;

use golab_core::{Element, Log};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Messages the worker pushes to a browser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// An edit to apply to the editor.
    Element { element: Element },

    /// Confirmation that a local edit replicated to enough peers.
    Ack { element: Element },

    /// A finished execution log.
    Log { log: Log },
}

/// Messages a browser sends the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Insert `text` to the right of `prev_id`.
    Insert { session_id: String, prev_id: String, text: String },

    /// Tombstone the element with `id`.
    Delete { session_id: String, id: String },
}

/// Registry of connected browsers.
#[derive(Default)]
pub struct ClientHub {
    inner: Mutex<HubInner>,
}

#[derive(Default)]
struct HubInner {
    clients: HashMap<String, mpsc::UnboundedSender<ServerMessage>>,
    client_sessions: HashMap<String, Vec<String>>,
}

impl ClientHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user's socket for a session. A reconnect under the
    /// same user id replaces the previous sender.
    pub fn register(&self, user_id: &str, session_id: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.clients.insert(user_id.to_string(), tx);
        let users = inner.client_sessions.entry(session_id.to_string()).or_default();
        if !users.iter().any(|u| u == user_id) {
            users.push(user_id.to_string());
        }
        rx
    }

    /// Drop a user everywhere; called when the socket closes.
    pub fn remove(&self, user_id: &str) {
        let mut inner = self.inner.lock();
        inner.clients.remove(user_id);
        for users in inner.client_sessions.values_mut() {
            users.retain(|u| u != user_id);
        }
    }

    /// A user leaves one session, keeping the socket.
    pub fn leave(&self, session_id: &str, user_id: &str) {
        if let Some(users) = self.inner.lock().client_sessions.get_mut(session_id) {
            users.retain(|u| u != user_id);
        }
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.inner.lock().clients.contains_key(user_id)
    }

    pub fn num_clients(&self) -> usize {
        self.inner.lock().clients.len()
    }

    /// Deliver to one user; silently dropped if the user is gone.
    pub fn send_to(&self, user_id: &str, message: ServerMessage) {
        let sender = self.inner.lock().clients.get(user_id).cloned();
        if let Some(sender) = sender {
            let _ = sender.send(message);
        }
    }

    /// Deliver to every user of a session, minus an optional originator.
    pub fn broadcast(&self, session_id: &str, message: &ServerMessage, except: Option<&str>) {
        let targets: Vec<mpsc::UnboundedSender<ServerMessage>> = {
            let inner = self.inner.lock();
            inner
                .client_sessions
                .get(session_id)
                .map(|users| {
                    users
                        .iter()
                        .filter(|u| except != Some(u.as_str()))
                        .filter_map(|u| inner.clients.get(u).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        for sender in targets {
            let _ = sender.send(message.clone());
        }
    }
}

#[cfg(test)]
#[path = "clients_tests.rs"]
mod tests;
