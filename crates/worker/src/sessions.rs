// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session residency and edit application.
//!
//! Local edits mint ids, apply, and queue for replication; incoming
//! peer elements land in the cache and apply when the session is
//! resident. Loading prefers peers (already converged and in memory)
//! over the FS server, and replays whatever the cache buffered while
//! the fetch was pending.

use std::collections::HashMap;

use golab_core::{Clock, Element, Log, Session};
use golab_wire::fs::{FsRequest, FsResponse};
use golab_wire::peer::{PeerRequest, PeerResponse};
use tracing::{info, warn};

use crate::clients::ServerMessage;
use crate::state::{PendingElement, Worker, WorkerError};

impl<C: Clock> Worker<C> {
    /// Apply a browser insert: mint an element after `prev_id`, splice
    /// it in, queue it for replication, and echo it to the session's
    /// other local clients.
    pub fn local_insert(
        &self,
        session_id: &str,
        user_id: &str,
        prev_id: &str,
        text: &str,
    ) -> Result<Element, WorkerError> {
        let element = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| WorkerError::SessionNotLoaded(session_id.to_string()))?;
            let element =
                session.mint(self.settings.worker_id, prev_id, text, self.clock.epoch_secs());
            if !session.add(element.clone()) {
                return Err(WorkerError::InvalidEdit(format!("unknown anchor {prev_id}")));
            }
            element
        };
        self.after_local_edit(session_id, user_id, element.clone());
        Ok(element)
    }

    /// Apply a browser delete: tombstone the element and replicate the
    /// tombstone.
    pub fn local_delete(
        &self,
        session_id: &str,
        user_id: &str,
        element_id: &str,
    ) -> Result<Element, WorkerError> {
        let tombstone = {
            let mut sessions = self.sessions.lock();
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| WorkerError::SessionNotLoaded(session_id.to_string()))?;
            if !session.delete(element_id) {
                return Err(WorkerError::InvalidEdit(format!(
                    "unknown or already deleted element {element_id}"
                )));
            }
            session
                .elements
                .get(element_id)
                .cloned()
                .ok_or_else(|| WorkerError::InvalidEdit(format!("element {element_id} vanished")))?
        };
        self.after_local_edit(session_id, user_id, tombstone.clone());
        Ok(tombstone)
    }

    fn after_local_edit(&self, session_id: &str, user_id: &str, element: Element) {
        self.modified.lock().insert(session_id.to_string());
        self.cache.lock().add(element.clone(), self.clock.epoch_ms());
        self.local_elements
            .lock()
            .push(PendingElement { element: element.clone(), user_id: user_id.to_string() });
        self.clients.broadcast(session_id, &ServerMessage::Element { element }, Some(user_id));
    }

    /// Apply a chunk of elements from a peer. Everything lands in the
    /// cache; resident sessions apply immediately and fan out to local
    /// clients.
    pub fn apply_incoming(&self, elements: Vec<Element>) {
        let now = self.clock.epoch_ms();
        for element in elements {
            self.cache.lock().add(element.clone(), now);
            let pending = self.cache.lock().is_pending(&element.session_id);
            let applied = {
                let mut sessions = self.sessions.lock();
                match sessions.get_mut(&element.session_id) {
                    Some(session) if !pending => session.apply(element.clone()),
                    _ => false,
                }
            };
            if applied {
                let session_id = element.session_id.clone();
                self.clients.broadcast(
                    &session_id,
                    &ServerMessage::Element { element },
                    None,
                );
            }
        }
    }

    /// Create an empty session if this worker does not hold it yet.
    pub fn create_session(&self, session_id: &str) {
        {
            let mut sessions = self.sessions.lock();
            if sessions.contains_key(session_id) {
                return;
            }
            sessions.insert(session_id.to_string(), Session::new(session_id));
        }
        self.modified.lock().insert(session_id.to_string());
        info!(%session_id, "session created");
    }

    /// Ensure `session_id` is resident: try each peer, then the FS
    /// server, then fall back to a fresh session. Cached elements
    /// buffered while the fetch was pending are replayed afterwards.
    pub async fn load_session(&self, session_id: &str) {
        if self.sessions.lock().contains_key(session_id) {
            return;
        }
        self.cache.lock().mark_pending(session_id);

        let mut fetched: Option<(Session, HashMap<String, Log>)> = None;
        for (addr, peer) in self.peer_snapshot() {
            let request = PeerRequest::GetSession { session_id: session_id.to_string() };
            match peer.call::<_, PeerResponse>(&request).await {
                Ok(PeerResponse::Session { session: Some(session), logs }) => {
                    info!(%session_id, %addr, "session fetched from peer");
                    fetched = Some((session, logs));
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(%session_id, %addr, error = %e, "peer session fetch failed"),
            }
        }
        if fetched.is_none() {
            let request = FsRequest::GetSession { session_id: session_id.to_string() };
            match self.fs.call::<_, FsResponse>(&request).await {
                Ok(FsResponse::Session { session: Some(session), logs }) => {
                    info!(%session_id, "session fetched from fs");
                    let logs = logs.into_iter().map(|l| (l.job.job_id.clone(), l)).collect();
                    fetched = Some((session, logs));
                }
                Ok(_) => {}
                Err(e) => warn!(%session_id, error = %e, "fs session fetch failed"),
            }
        }

        let (session, logs) = fetched.unwrap_or_else(|| {
            info!(%session_id, "session not found anywhere, starting fresh");
            (Session::new(session_id), HashMap::new())
        });

        let cached = self.cache.lock().get(session_id);
        {
            let mut sessions = self.sessions.lock();
            let entry = sessions.entry(session_id.to_string()).or_insert(session);
            for element in cached {
                entry.apply(element);
            }
        }
        self.logs.lock().entry(session_id.to_string()).or_default().extend(logs);
        self.cache.lock().clear_pending(session_id);
        info!(%session_id, "session loaded");
    }

    /// Clone of a resident session and its logs, for peer fetches and
    /// the HTTP shim.
    pub fn session_snapshot(&self, session_id: &str) -> Option<(Session, HashMap<String, Log>)> {
        let session = self.sessions.lock().get(session_id).cloned()?;
        let logs = self.logs.lock().get(session_id).cloned().unwrap_or_default();
        Some((session, logs))
    }
}
