// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker behavior tests against stub load-balancer and FS services.

use std::collections::HashMap;

use golab_core::{Element, FakeClock, Log, Session, INITIAL_ID};
use golab_wire::balancer::{LbRequest, LbResponse, WorkerNetSettings};
use golab_wire::fs::{FsRequest, FsResponse};
use serial_test::serial;
use tokio::net::TcpListener;

use super::*;
use crate::clients::ServerMessage;
use crate::runner::{FakeRunner, SnippetRunner};

struct StubLb;

async fn lb_handle(_: Arc<StubLb>, request: LbRequest) -> LbResponse {
    match request {
        LbRequest::RegisterNewWorker { .. } => LbResponse::Settings {
            settings: WorkerNetSettings {
                worker_id: 1,
                heartbeat_ms: 600_000,
                min_peer_connections: 2,
            },
        },
        LbRequest::GetNodes { .. } => LbResponse::Nodes { addrs: Vec::new() },
        _ => LbResponse::Ok,
    }
}

#[derive(Default)]
struct StubFs {
    logs: Mutex<HashMap<String, Log>>,
    sessions: Mutex<HashMap<String, Session>>,
}

async fn fs_handle(stub: Arc<StubFs>, request: FsRequest) -> FsResponse {
    match request {
        FsRequest::SaveLog { log } => {
            stub.logs.lock().insert(log.job.job_id.clone(), log);
            FsResponse::Started
        }
        FsRequest::GetLog { job_id } => {
            FsResponse::Log { log: stub.logs.lock().get(&job_id).cloned() }
        }
        FsRequest::SaveSession { session } => {
            stub.sessions.lock().insert(session.id.clone(), session);
            FsResponse::Started
        }
        FsRequest::GetSession { session_id } => FsResponse::Session {
            session: stub.sessions.lock().get(&session_id).cloned(),
            logs: Vec::new(),
        },
        _ => FsResponse::Ok,
    }
}

static PARKED_TICKS: std::sync::Once = std::sync::Once::new();

/// Boot a worker against stub services, with background replication
/// effectively parked so ticks only run when a test drives them.
async fn boot(runner: Arc<dyn SnippetRunner>) -> (Arc<Worker<FakeClock>>, Arc<StubFs>) {
    PARKED_TICKS.call_once(|| std::env::set_var("GOLAB_ELEMENT_DELAY_MS", "3600000"));

    let lb_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let lb_addr = lb_listener.local_addr().unwrap().to_string();
    tokio::spawn(golab_wire::serve(lb_listener, Arc::new(StubLb), lb_handle));

    let fs_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let fs_addr = fs_listener.local_addr().unwrap().to_string();
    let fs = Arc::new(StubFs::default());
    tokio::spawn(golab_wire::serve(fs_listener, Arc::clone(&fs), fs_handle));

    let worker =
        Worker::start_with(&lb_addr, &fs_addr, FakeClock::new(), runner, false).await.unwrap();
    (worker, fs)
}

fn remote_elem(session: &str, id: &str, text: &str) -> Element {
    Element {
        session_id: session.to_string(),
        client_id: "9".to_string(),
        id: id.to_string(),
        prev_id: INITIAL_ID.to_string(),
        next_id: String::new(),
        text: text.to_string(),
        deleted: false,
        timestamp: 0,
    }
}

fn drain_acks(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ServerMessage>) -> usize {
    let mut acks = 0;
    while let Ok(message) = rx.try_recv() {
        if matches!(message, ServerMessage::Ack { .. }) {
            acks += 1;
        }
    }
    acks
}

#[tokio::test]
#[serial]
async fn edits_are_acked_once_enough_peers_confirm() {
    let (worker, _fs) = boot(FakeRunner::stdout("")).await;
    worker.create_session("s");
    let mut rx = worker.clients.register("u1", "s");

    for _ in 0..3 {
        worker.local_insert("s", "u1", INITIAL_ID, "x").unwrap();
    }
    assert_eq!(worker.local_elements.lock().len(), 3);

    // Two peers confirmed the whole queue: quorum met, everything acks.
    worker.settle_tick(3, 2);
    assert!(worker.local_elements.lock().is_empty());
    assert!(worker.elements_to_ack.lock().is_empty());
    assert_eq!(drain_acks(&mut rx), 3);
}

#[tokio::test]
#[serial]
async fn below_quorum_elements_ride_the_next_tick() {
    let (worker, _fs) = boot(FakeRunner::stdout("")).await;
    worker.create_session("s");
    let mut rx = worker.clients.register("u1", "s");

    worker.local_insert("s", "u1", INITIAL_ID, "a").unwrap();
    worker.local_insert("s", "u1", "11", "b").unwrap();

    // Only one peer confirmed: keep waiting.
    worker.settle_tick(2, 1);
    assert!(worker.local_elements.lock().is_empty());
    assert_eq!(worker.elements_to_ack.lock().len(), 2);
    assert_eq!(drain_acks(&mut rx), 0);

    // Next tick reaches the quorum.
    worker.settle_tick(0, 2);
    assert!(worker.elements_to_ack.lock().is_empty());
    assert_eq!(drain_acks(&mut rx), 2);
}

#[tokio::test]
#[serial]
async fn edits_appended_mid_tick_stay_buffered() {
    let (worker, _fs) = boot(FakeRunner::stdout("")).await;
    worker.create_session("s");
    let mut rx = worker.clients.register("u1", "s");

    worker.local_insert("s", "u1", INITIAL_ID, "a").unwrap();
    worker.local_insert("s", "u1", "11", "b").unwrap();
    // The tick started with two elements; a third lands mid-tick.
    worker.local_insert("s", "u1", "21", "c").unwrap();

    worker.settle_tick(2, 2);
    assert_eq!(worker.local_elements.lock().len(), 1, "mid-tick edit waits for the next tick");
    assert_eq!(drain_acks(&mut rx), 2);
}

#[tokio::test]
#[serial]
async fn disconnected_originators_need_no_ack() {
    let (worker, _fs) = boot(FakeRunner::stdout("")).await;
    worker.create_session("s");
    let mut rx = worker.clients.register("u1", "s");

    worker.local_insert("s", "u1", INITIAL_ID, "a").unwrap();
    worker.clients.remove("u1");

    worker.settle_tick(1, 2);
    assert!(worker.elements_to_ack.lock().is_empty());
    assert_eq!(drain_acks(&mut rx), 0);
}

#[tokio::test]
#[serial]
async fn run_job_executes_once_and_replays_the_stored_log() {
    let runner = FakeRunner::stdout("hi\n");
    let (worker, fs) = boot(runner.clone()).await;
    fs.logs.lock().insert("s-1".to_string(), Log::pending("s", "s-1", "println(1)"));

    let log = worker.run_job("s-1").await.unwrap();
    assert!(log.job.done);
    assert_eq!(log.output, "hi\n");
    assert_eq!(runner.calls(), 1);

    // The final log was written back through the FS server.
    assert!(fs.logs.lock().get("s-1").unwrap().job.done);

    // A replay returns the stored log without running again.
    let again = worker.run_job("s-1").await.unwrap();
    assert_eq!(again, log);
    assert_eq!(runner.calls(), 1);
}

#[tokio::test]
#[serial]
async fn incoming_elements_apply_and_reach_every_local_client() {
    let (worker, _fs) = boot(FakeRunner::stdout("")).await;
    worker.create_session("s");
    let mut rx1 = worker.clients.register("u1", "s");
    let mut rx2 = worker.clients.register("u2", "s");

    worker.apply_incoming(vec![remote_elem("s", "19", "a")]);

    let (session, _) = worker.session_snapshot("s").unwrap();
    assert_eq!(session.text(), "a");
    assert!(matches!(rx1.try_recv(), Ok(ServerMessage::Element { .. })));
    assert!(matches!(rx2.try_recv(), Ok(ServerMessage::Element { .. })));
}

#[tokio::test]
#[serial]
async fn elements_for_absent_sessions_wait_in_the_cache() {
    let (worker, _fs) = boot(FakeRunner::stdout("")).await;

    worker.apply_incoming(vec![remote_elem("s2", "19", "a")]);
    assert!(worker.session_snapshot("s2").is_none());

    // Loading finds nothing remotely and replays the cached element.
    worker.load_session("s2").await;
    let (session, _) = worker.session_snapshot("s2").unwrap();
    assert_eq!(session.text(), "a");
}

#[tokio::test]
#[serial]
async fn load_session_takes_the_fs_copy_when_no_peer_has_it() {
    let (worker, fs) = boot(FakeRunner::stdout("")).await;
    let mut session = Session::new("s3");
    let e = session.mint(7, INITIAL_ID, "z", 0);
    session.add(e);
    fs.sessions.lock().insert("s3".to_string(), session);

    worker.load_session("s3").await;
    let (loaded, _) = worker.session_snapshot("s3").unwrap();
    assert_eq!(loaded.text(), "z");
}

#[tokio::test]
#[serial]
async fn submit_job_writes_the_pending_log_through_fs() {
    let (worker, fs) = boot(FakeRunner::stdout("")).await;

    let job_id = worker.submit_job("s", "println(1)").await.unwrap();
    assert_eq!(job_id, "s-1000", "FakeClock epoch seeds the job id");

    let stored = fs.logs.lock().get(&job_id).cloned().unwrap();
    assert!(!stored.job.done);
    assert_eq!(stored.job.snippet, "println(1)");
    assert_eq!(stored.output, "");
}

#[tokio::test]
#[serial]
async fn dirty_sessions_push_to_fs_and_clear() {
    let (worker, fs) = boot(FakeRunner::stdout("")).await;
    worker.create_session("s");
    let _rx = worker.clients.register("u1", "s");
    worker.local_insert("s", "u1", INITIAL_ID, "a").unwrap();

    assert!(worker.modified.lock().contains("s"));
    worker.save_modified_sessions().await;
    assert!(!worker.modified.lock().contains("s"));
    assert_eq!(fs.sessions.lock().get("s").unwrap().text(), "a");
}
