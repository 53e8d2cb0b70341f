// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer-facing RPC dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use golab_core::Clock;
use golab_wire::peer::{PeerRequest, PeerResponse};
use golab_wire::RpcClient;
use tracing::info;

use crate::state::Worker;

/// Dispatch one request from a peer worker or the load balancer.
pub(crate) async fn handle<C: Clock>(worker: Arc<Worker<C>>, request: PeerRequest) -> PeerResponse {
    match request {
        PeerRequest::PingWorker => PeerResponse::Pong,

        PeerRequest::BidirectionalSetup { rpc_addr } => {
            if worker.peers.lock().contains_key(&rpc_addr) {
                return PeerResponse::Ok;
            }
            match RpcClient::connect(&rpc_addr).await {
                Ok(client) => {
                    worker.peers.lock().insert(rpc_addr.clone(), Arc::new(client));
                    info!(%rpc_addr, "peer dialled back");
                    PeerResponse::Ok
                }
                Err(e) => PeerResponse::Error { message: format!("dial back {rpc_addr}: {e}") },
            }
        }

        PeerRequest::ApplyIncomingElements { elements } => {
            worker.apply_incoming(elements);
            PeerResponse::Ok
        }

        PeerRequest::GetSession { session_id } => match worker.session_snapshot(&session_id) {
            Some((session, logs)) => PeerResponse::Session { session: Some(session), logs },
            None => PeerResponse::Session { session: None, logs: HashMap::new() },
        },

        PeerRequest::CreateNewSession { session_id } => {
            worker.create_session(&session_id);
            PeerResponse::Ok
        }

        PeerRequest::LoadSession { session_id } => {
            worker.load_session(&session_id).await;
            PeerResponse::Ok
        }

        PeerRequest::RunJob { job_id } => PeerResponse::Log { log: worker.run_job(&job_id).await },

        PeerRequest::SendLog { log } => {
            worker.send_log(log);
            PeerResponse::Ok
        }
    }
}
