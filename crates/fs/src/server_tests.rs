// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Membership, fan-out, and read-failover tests against stub nodes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use golab_core::{FakeClock, Log, Session, INITIAL_ID};
use golab_wire::fs::FsResponse;
use golab_wire::node::{NodeRequest, NodeResponse};
use parking_lot::Mutex;
use tokio::net::TcpListener;

use super::*;

#[derive(Default)]
struct StubNode {
    sessions: Mutex<HashMap<String, Session>>,
    logs: Mutex<HashMap<String, Log>>,
    fail_reads: AtomicBool,
}

async fn stub_handle(node: Arc<StubNode>, request: NodeRequest) -> NodeResponse {
    match request {
        NodeRequest::SaveSession { session } => {
            node.sessions.lock().insert(session.id.clone(), session);
            NodeResponse::Saved { ok: true }
        }
        NodeRequest::GetSession { session_id } => {
            if node.fail_reads.load(Ordering::Relaxed) {
                return NodeResponse::Session { session: None };
            }
            NodeResponse::Session { session: node.sessions.lock().get(&session_id).cloned() }
        }
        NodeRequest::SaveLog { log } => {
            node.logs.lock().insert(log.job.job_id.clone(), log);
            NodeResponse::Saved { ok: true }
        }
        NodeRequest::GetLog { job_id } => {
            if node.fail_reads.load(Ordering::Relaxed) {
                return NodeResponse::Log { log: None };
            }
            NodeResponse::Log { log: node.logs.lock().get(&job_id).cloned() }
        }
    }
}

async fn spawn_stub() -> (String, Arc<StubNode>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let node = Arc::new(StubNode::default());
    tokio::spawn(golab_wire::serve(listener, Arc::clone(&node), stub_handle));
    (addr, node)
}

async fn register(server: &Arc<FsServer<FakeClock>>, addr: &str) -> String {
    match server.register_node(String::new(), addr.to_string()).await {
        FsResponse::Registered { accepted: true, node_id: Some(id) } => id,
        other => panic!("registration failed: {other:?}"),
    }
}

fn sample_session(id: &str) -> Session {
    let mut session = Session::new(id);
    let e = session.mint(1, INITIAL_ID, "a", 0);
    session.add(e);
    session
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn registration_mints_ids_and_rejects_unknown() {
    let server = FsServer::with_clock(FakeClock::new());
    let (addr, _stub) = spawn_stub().await;

    let id = register(&server, &addr).await;
    assert_eq!(id.len(), 16);

    // An id the server never minted is rejected.
    match server.register_node("ghost".to_string(), addr.clone()).await {
        FsResponse::Registered { accepted, node_id } => {
            assert!(!accepted);
            assert!(node_id.is_none());
        }
        other => panic!("unexpected response: {other:?}"),
    }

    // The minted id is re-accepted without assigning a new one.
    match server.register_node(id, addr).await {
        FsResponse::Registered { accepted, node_id } => {
            assert!(accepted);
            assert!(node_id.is_none());
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn save_session_fans_out_to_every_live_node() {
    let server = FsServer::with_clock(FakeClock::new());
    let (addr_a, stub_a) = spawn_stub().await;
    let (addr_b, stub_b) = spawn_stub().await;
    register(&server, &addr_a).await;
    register(&server, &addr_b).await;

    server.save_session(sample_session("s1"));
    wait_until(|| {
        stub_a.sessions.lock().contains_key("s1") && stub_b.sessions.lock().contains_key("s1")
    })
    .await;

    let (session, logs) = server.get_session("s1").await.unwrap();
    assert_eq!(session.text(), "a");
    assert!(logs.is_empty());
}

#[tokio::test]
async fn read_failover_falls_through_to_a_healthy_replica() {
    let server = FsServer::with_clock(FakeClock::new());
    let (addr_a, stub_a) = spawn_stub().await;
    let (addr_b, stub_b) = spawn_stub().await;
    register(&server, &addr_a).await;
    register(&server, &addr_b).await;

    server.save_session(sample_session("s1"));
    wait_until(|| {
        stub_a.sessions.lock().contains_key("s1") && stub_b.sessions.lock().contains_key("s1")
    })
    .await;

    stub_a.fail_reads.store(true, Ordering::Relaxed);
    let (session, _) = server.get_session("s1").await.expect("healthy replica should answer");
    assert_eq!(session.id, "s1");
}

#[tokio::test]
async fn failed_reads_evict_the_replica() {
    let server = FsServer::with_clock(FakeClock::new());
    let (addr, stub) = spawn_stub().await;
    register(&server, &addr).await;

    server.save_session(sample_session("s1"));
    wait_until(|| stub.sessions.lock().contains_key("s1")).await;

    stub.fail_reads.store(true, Ordering::Relaxed);
    assert!(server.get_session("s1").await.is_none());

    // The node recovered, but its entry in the replica set is gone
    // until the session is saved again.
    stub.fail_reads.store(false, Ordering::Relaxed);
    assert!(server.get_session("s1").await.is_none());

    server.save_session(sample_session("s1"));
    wait_until(|| stub.sessions.lock().contains_key("s1")).await;
    assert!(server.get_session("s1").await.is_some());
}

#[tokio::test]
async fn silent_nodes_drop_out_of_the_fanout() {
    let clock = FakeClock::new();
    let server = FsServer::with_clock(clock.clone());
    let (addr, stub) = spawn_stub().await;
    let node_id = register(&server, &addr).await;

    clock.advance(HEARTBEAT_TIMEOUT + Duration::from_millis(500));
    server.save_session(sample_session("s1"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(stub.sessions.lock().is_empty(), "dead node must not receive writes");

    // A heartbeat brings the node back into the next fan-out.
    server.heartbeat(&node_id);
    server.save_session(sample_session("s1"));
    wait_until(|| stub.sessions.lock().contains_key("s1")).await;
}

#[tokio::test]
async fn heartbeats_inside_the_window_keep_a_node_live() {
    let clock = FakeClock::new();
    let server = FsServer::with_clock(clock.clone());
    let (addr, stub) = spawn_stub().await;
    let node_id = register(&server, &addr).await;

    clock.advance(Duration::from_millis(1500));
    server.heartbeat(&node_id);
    clock.advance(Duration::from_millis(1500));

    server.save_session(sample_session("s1"));
    wait_until(|| stub.sessions.lock().contains_key("s1")).await;
}

#[tokio::test]
async fn get_session_carries_all_indexed_logs() {
    let server = FsServer::with_clock(FakeClock::new());
    let (addr, stub) = spawn_stub().await;
    register(&server, &addr).await;

    server.save_session(sample_session("s1"));
    server.save_log(Log::pending("s1", "s1-100", "println(1)"));
    server.save_log(Log::pending("s1", "s1-101", "println(2)"));
    wait_until(|| stub.logs.lock().len() == 2 && stub.sessions.lock().len() == 1).await;

    let (_, logs) = server.get_session("s1").await.unwrap();
    let mut job_ids: Vec<_> = logs.iter().map(|l| l.job.job_id.clone()).collect();
    job_ids.sort();
    assert_eq!(job_ids, ["s1-100", "s1-101"]);

    // Logs for other sessions stay out of the index.
    server.save_log(Log::pending("s2", "s2-100", "println(3)"));
    wait_until(|| stub.logs.lock().len() == 3).await;
    let (_, logs) = server.get_session("s1").await.unwrap();
    assert_eq!(logs.len(), 2);
}
