// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The outbound replication tick.
//!
//! Every tick: push dirty sessions to the FS server, send the element
//! queue (fresh local edits plus everything still awaiting a quorum)
//! to each peer in chunks, then settle the bookkeeping — success
//! counting first, quorum decision second, acknowledgement last, never
//! interleaved with in-flight sends. New edits appended mid-tick stay
//! in the buffer for the next tick.

use std::sync::Arc;

use golab_core::{Clock, Element};
use golab_wire::balancer::{LbRequest, LbResponse};
use golab_wire::fs::{FsRequest, FsResponse};
use golab_wire::peer::{PeerRequest, PeerResponse};
use golab_wire::RpcClient;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::clients::ServerMessage;
use crate::env;
use crate::state::{PendingElement, Worker};

/// Elements per `ApplyIncomingElements` call.
pub const CHUNK_SIZE: usize = 30;

impl<C: Clock> Worker<C> {
    pub(crate) fn spawn_replication(self: &Arc<Self>, auto_save: bool) {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(env::element_delay()).await;
                worker.replicate_tick(auto_save).await;
            }
        });
    }

    /// One replication tick.
    pub async fn replicate_tick(&self, auto_save: bool) {
        if auto_save {
            self.save_modified_sessions().await;
        }

        let (queue, num_local) = {
            let locals = self.local_elements.lock();
            let acks = self.elements_to_ack.lock();
            let mut queue: Vec<Element> = locals.iter().map(|p| p.element.clone()).collect();
            queue.extend(acks.iter().map(|p| p.element.clone()));
            (queue, locals.len())
        };

        self.refresh_peers().await;

        let num_success = if queue.is_empty() { 0 } else { self.send_queue(&queue).await };
        self.settle_tick(num_local, num_success);
    }

    /// Push every dirty session to the FS server, clearing the dirty
    /// mark once the save has been accepted.
    pub(crate) async fn save_modified_sessions(&self) {
        let dirty: Vec<String> = self.modified.lock().iter().cloned().collect();
        for session_id in dirty {
            let snapshot = self.sessions.lock().get(&session_id).cloned();
            let Some(session) = snapshot else {
                self.modified.lock().remove(&session_id);
                continue;
            };
            match self.fs.call::<_, FsResponse>(&FsRequest::SaveSession { session }).await {
                Ok(FsResponse::Started) => {
                    self.modified.lock().remove(&session_id);
                }
                Ok(other) => {
                    warn!(%session_id, response = ?other, "unexpected save response")
                }
                Err(e) => warn!(%session_id, error = %e, "session save failed, will retry"),
            }
        }
    }

    /// Ping every peer, dropping the dead, and top back up through the
    /// load balancer when below the connection floor.
    pub(crate) async fn refresh_peers(&self) {
        for (addr, peer) in self.peer_snapshot() {
            let alive = matches!(
                peer.call::<_, PeerResponse>(&PeerRequest::PingWorker).await,
                Ok(PeerResponse::Pong)
            );
            if !alive {
                warn!(%addr, "peer unresponsive, evicting");
                self.peers.lock().remove(&addr);
            }
        }
        if self.peers.lock().len() < self.settings.min_peer_connections {
            self.get_peers().await;
        }
    }

    /// Ask the load balancer for peers and establish duplex links to
    /// any we are not already connected to.
    pub(crate) async fn get_peers(&self) {
        let request = LbRequest::GetNodes { worker_id: self.settings.worker_id };
        let addrs = match self.lb.call::<_, LbResponse>(&request).await {
            Ok(LbResponse::Nodes { addrs }) => addrs,
            Ok(other) => {
                warn!(response = ?other, "unexpected GetNodes response");
                return;
            }
            Err(e) => {
                warn!(error = %e, "GetNodes failed");
                return;
            }
        };
        for addr in addrs {
            if addr == self.rpc_addr || self.peers.lock().contains_key(&addr) {
                continue;
            }
            match RpcClient::connect(&addr).await {
                Ok(client) => {
                    let setup = PeerRequest::BidirectionalSetup { rpc_addr: self.rpc_addr.clone() };
                    match client.call::<_, PeerResponse>(&setup).await {
                        Ok(_) => {
                            info!(%addr, "peer connected");
                            self.peers.lock().insert(addr, Arc::new(client));
                        }
                        Err(e) => warn!(%addr, error = %e, "bidirectional setup failed"),
                    }
                }
                Err(e) => warn!(%addr, error = %e, "peer dial failed"),
            }
        }
    }

    /// Send the queue to every peer in chunks, in parallel. A peer
    /// counts as a success only if every chunk was accepted; failing
    /// peers are evicted.
    async fn send_queue(&self, queue: &[Element]) -> usize {
        let mut tasks = JoinSet::new();
        for (addr, peer) in self.peer_snapshot() {
            let chunks: Vec<Vec<Element>> = queue.chunks(CHUNK_SIZE).map(<[Element]>::to_vec).collect();
            tasks.spawn(async move {
                for chunk in chunks {
                    let request = PeerRequest::ApplyIncomingElements { elements: chunk };
                    match peer.call::<_, PeerResponse>(&request).await {
                        Ok(PeerResponse::Ok) => {}
                        _ => return (addr, false),
                    }
                }
                (addr, true)
            });
        }

        let mut num_success = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok((_, true)) => num_success += 1,
                Ok((addr, false)) => {
                    warn!(%addr, "element send failed, evicting peer");
                    self.peers.lock().remove(&addr);
                }
                Err(e) => warn!(error = %e, "send task failed"),
            }
        }
        num_success
    }

    /// Post-send bookkeeping: move the attempted local batch into the
    /// ack queue, prune entries whose originating client is gone, and
    /// deliver acknowledgements once enough peers confirmed the queue.
    pub fn settle_tick(&self, num_local: usize, num_success: usize) {
        let to_ack: Vec<PendingElement> = {
            let mut locals = self.local_elements.lock();
            let mut acks = self.elements_to_ack.lock();
            let take = num_local.min(locals.len());
            let attempted: Vec<PendingElement> = locals.drain(..take).collect();
            acks.extend(attempted);
            // Disconnected originators no longer need a local ack.
            acks.retain(|p| self.clients.is_connected(&p.user_id));
            if num_success >= self.settings.min_peer_connections {
                acks.drain(..).collect()
            } else {
                Vec::new()
            }
        };
        for pending in to_ack {
            self.clients.send_to(&pending.user_id, ServerMessage::Ack { element: pending.element });
        }
    }
}
