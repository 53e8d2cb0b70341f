// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Membership, routing, and dispatch tests against stub workers.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use golab_core::FakeClock;
use parking_lot::Mutex;

use super::*;

struct StubWorker {
    requests: Mutex<Vec<PeerRequest>>,
    fail_run: AtomicBool,
}

impl StubWorker {
    fn new() -> Arc<Self> {
        Arc::new(StubWorker { requests: Mutex::new(Vec::new()), fail_run: AtomicBool::new(false) })
    }

    fn requests(&self) -> Vec<PeerRequest> {
        self.requests.lock().clone()
    }
}

async fn stub_handle(worker: Arc<StubWorker>, request: PeerRequest) -> PeerResponse {
    worker.requests.lock().push(request.clone());
    match request {
        PeerRequest::RunJob { job_id } => {
            if worker.fail_run.load(Ordering::Relaxed) {
                return PeerResponse::Error { message: "runner unavailable".to_string() };
            }
            let mut log = Log::pending("s", job_id, "println(1)");
            log.job.done = true;
            log.output = "hi\n".to_string();
            PeerResponse::Log { log: Some(log) }
        }
        _ => PeerResponse::Ok,
    }
}

async fn spawn_stub() -> (String, Arc<StubWorker>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let worker = StubWorker::new();
    tokio::spawn(serve(listener, Arc::clone(&worker), stub_handle));
    (addr, worker)
}

fn register(server: &Arc<LbServer<FakeClock>>, rpc_addr: &str) -> u32 {
    match server.register_new_worker(rpc_addr.to_string(), format!("http-{rpc_addr}")) {
        LbResponse::Settings { settings } => settings.worker_id,
        other => panic!("registration failed: {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_rpc_address_is_rejected() {
    let server = LbServer::with_clock(FakeClock::new());
    register(&server, "127.0.0.1:9001");
    match server.register_new_worker("127.0.0.1:9001".to_string(), "h".to_string()) {
        LbResponse::Error { message } => assert!(message.contains("already registered")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn one_missed_window_is_a_strike_two_evict() {
    let clock = FakeClock::new();
    let server = LbServer::with_clock(clock.clone());
    let worker_id = register(&server, "127.0.0.1:9001");

    // First missed window: retained with a strike.
    clock.advance(HEARTBEAT_INTERVAL + Duration::from_millis(500));
    assert!(server.check_worker(worker_id));
    assert!(matches!(server.get_nodes(worker_id), LbResponse::Nodes { .. }));

    // Second consecutive miss: evicted.
    clock.advance(HEARTBEAT_INTERVAL + Duration::from_millis(500));
    assert!(!server.check_worker(worker_id));
    assert!(matches!(server.get_nodes(worker_id), LbResponse::Error { .. }));
}

#[tokio::test]
async fn a_heartbeat_resets_strikes() {
    let clock = FakeClock::new();
    let server = LbServer::with_clock(clock.clone());
    let worker_id = register(&server, "127.0.0.1:9001");

    clock.advance(HEARTBEAT_INTERVAL + Duration::from_millis(500));
    assert!(server.check_worker(worker_id), "first miss is absorbed");

    assert_eq!(server.heartbeat(worker_id, 0), LbResponse::Ok);
    clock.advance(HEARTBEAT_INTERVAL + Duration::from_millis(500));
    // This miss is again the first since the heartbeat: still retained.
    assert!(server.check_worker(worker_id));
}

#[tokio::test]
async fn heartbeat_from_unknown_worker_errors() {
    let server = LbServer::with_clock(FakeClock::new());
    assert!(matches!(server.heartbeat(42, 0), LbResponse::Error { .. }));
}

#[tokio::test]
async fn get_nodes_is_stable_capped_and_excludes_the_caller() {
    let server = LbServer::with_clock(FakeClock::new());
    let mut ids = Vec::new();
    for port in 9001..9007 {
        ids.push(register(&server, &format!("127.0.0.1:{port}")));
    }

    let first = server.get_nodes(ids[0]);
    let second = server.get_nodes(ids[0]);
    assert_eq!(first, second, "peer set must be stable across calls");

    match first {
        LbResponse::Nodes { addrs } => {
            assert_eq!(addrs.len(), NUM_WORKER_TO_RETURN);
            assert!(!addrs.contains(&"127.0.0.1:9001".to_string()), "caller excluded");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    assert!(matches!(server.get_nodes(999), LbResponse::Error { .. }));
}

#[tokio::test]
async fn clients_route_to_the_least_loaded_worker() {
    let server = LbServer::with_clock(FakeClock::new());
    let (addr_a, stub_a) = spawn_stub().await;
    let (addr_b, stub_b) = spawn_stub().await;
    let id_a = register(&server, &addr_a);
    let id_b = register(&server, &addr_b);
    server.heartbeat(id_a, 3);
    server.heartbeat(id_b, 1);

    // First sighting of the session: CreateNewSession on the less
    // loaded worker.
    match server.register_new_client("S".to_string()).await {
        LbResponse::WorkerAddr { http_addr: Some(addr) } => {
            assert_eq!(addr, format!("http-{addr_b}"))
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert!(matches!(
        stub_b.requests().as_slice(),
        [PeerRequest::CreateNewSession { session_id }] if session_id == "S"
    ));
    assert!(stub_a.requests().is_empty());

    // The session is now known: the next client gets LoadSession.
    match server.register_new_client("S".to_string()).await {
        LbResponse::WorkerAddr { http_addr: Some(addr) } => {
            assert_eq!(addr, format!("http-{addr_b}"))
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert!(matches!(
        stub_b.requests().last(),
        Some(PeerRequest::LoadSession { session_id }) if session_id == "S"
    ));
}

#[tokio::test]
async fn routing_returns_empty_without_workers() {
    let server = LbServer::with_clock(FakeClock::new());
    assert_eq!(
        server.register_new_client("S".to_string()).await,
        LbResponse::WorkerAddr { http_addr: None }
    );
}

#[tokio::test]
async fn routing_skips_unreachable_workers() {
    let server = LbServer::with_clock(FakeClock::new());
    let (addr_b, stub_b) = spawn_stub().await;
    // Least-loaded candidate is a dead address; the walk must move on.
    let id_dead = register(&server, "127.0.0.1:9");
    let id_b = register(&server, &addr_b);
    server.heartbeat(id_dead, 0);
    server.heartbeat(id_b, 5);

    match server.register_new_client("S".to_string()).await {
        LbResponse::WorkerAddr { http_addr: Some(addr) } => {
            assert_eq!(addr, format!("http-{addr_b}"))
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(stub_b.requests().len(), 1);
}

#[tokio::test]
async fn jobs_run_once_and_logs_broadcast_to_all_workers() {
    let server = LbServer::with_clock(FakeClock::new());
    let (addr_a, stub_a) = spawn_stub().await;
    let (addr_b, stub_b) = spawn_stub().await;
    let id_a = register(&server, &addr_a);
    let id_b = register(&server, &addr_b);
    server.heartbeat(id_a, 0);
    server.heartbeat(id_b, 2);

    assert_eq!(server.new_job("S-100".to_string(), id_b).await, LbResponse::Ok);

    let runs_a = stub_a
        .requests()
        .iter()
        .filter(|r| matches!(r, PeerRequest::RunJob { .. }))
        .count();
    let runs_b = stub_b
        .requests()
        .iter()
        .filter(|r| matches!(r, PeerRequest::RunJob { .. }))
        .count();
    assert_eq!((runs_a, runs_b), (1, 0), "least-loaded worker runs the job");

    // Both workers, the origin included, receive the broadcast.
    for stub in [&stub_a, &stub_b] {
        assert!(stub
            .requests()
            .iter()
            .any(|r| matches!(r, PeerRequest::SendLog { log } if log.job.job_id == "S-100")));
    }
}

#[tokio::test]
async fn job_dispatch_fails_over_to_the_next_worker() {
    let server = LbServer::with_clock(FakeClock::new());
    let (addr_a, stub_a) = spawn_stub().await;
    let (addr_b, stub_b) = spawn_stub().await;
    stub_a.fail_run.store(true, Ordering::Relaxed);
    let id_a = register(&server, &addr_a);
    let id_b = register(&server, &addr_b);
    server.heartbeat(id_a, 0);
    server.heartbeat(id_b, 2);

    assert_eq!(server.new_job("S-100".to_string(), id_a).await, LbResponse::Ok);

    assert!(stub_b
        .requests()
        .iter()
        .any(|r| matches!(r, PeerRequest::RunJob { .. })));
    assert!(stub_b
        .requests()
        .iter()
        .any(|r| matches!(r, PeerRequest::SendLog { .. })));
}
