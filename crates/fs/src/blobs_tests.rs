// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use golab_core::{Log, Session, INITIAL_ID};

use super::*;

fn store() -> (tempfile::TempDir, BlobStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = BlobStore::open(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn session_blob_round_trips() {
    let (_dir, store) = store();

    let mut session = Session::new("s1");
    let a = session.mint(1, INITIAL_ID, "a", 0);
    session.add(a);

    store.save_session(&session).unwrap();
    let restored = store.get_session("s1").unwrap().unwrap();
    assert_eq!(restored, session);
}

#[test]
fn save_truncates_and_rewrites() {
    let (_dir, store) = store();

    let mut session = Session::new("s1");
    for _ in 0..20 {
        let e = session.mint(1, INITIAL_ID, "x", 0);
        session.add(e);
    }
    store.save_session(&session).unwrap();

    // A smaller rewrite fully replaces the old, larger blob.
    let small = Session::new("s1");
    store.save_session(&small).unwrap();
    let restored = store.get_session("s1").unwrap().unwrap();
    assert_eq!(restored, small);
}

#[test]
fn missing_blobs_read_as_none() {
    let (_dir, store) = store();
    assert!(store.get_session("nope").unwrap().is_none());
    assert!(store.get_log("nope").unwrap().is_none());
}

#[test]
fn log_blob_round_trips() {
    let (_dir, store) = store();

    let mut log = Log::pending("s1", "s1-100", "println(1)");
    log.job.done = true;
    log.output = "1\n".to_string();

    store.save_log(&log).unwrap();
    assert_eq!(store.get_log("s1-100").unwrap().unwrap(), log);
}

#[test]
fn node_id_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = BlobStore::open(dir.path()).unwrap();
        assert!(store.node_id().is_none());
        store.store_node_id("abc123").unwrap();
    }
    let store = BlobStore::open(dir.path()).unwrap();
    assert_eq!(store.node_id().as_deref(), Some("abc123"));
}
