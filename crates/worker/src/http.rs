// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing HTTP and WebSocket shim.
//!
//! A thin adapter over the worker service object: handlers parse the
//! request, call into the worker, and shape the reply. All state
//! transitions live in the worker.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures_util::{SinkExt, StreamExt};
use golab_core::{Clock, Element, Log, Session};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clients::ClientMessage;
use crate::state::Worker;

#[derive(Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Deserialize)]
struct LeaveQuery {
    #[serde(rename = "sessionID")]
    session_id: String,
    #[serde(rename = "userID")]
    user_id: String,
}

#[derive(Deserialize)]
struct WsQuery {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "sessionID")]
    session_id: String,
}

#[derive(Deserialize)]
struct ExecuteForm {
    #[serde(rename = "sessionID")]
    session_id: String,
    snippet: String,
}

#[derive(Serialize)]
struct SessionView {
    session: Session,
    logs: Vec<Log>,
}

#[derive(Serialize)]
struct RecoverView {
    #[serde(rename = "cachedElements")]
    cached_elements: Vec<Element>,
    logs: Vec<Log>,
}

#[derive(Serialize)]
struct ExecuteReply {
    #[serde(rename = "JobID")]
    job_id: String,
    #[serde(rename = "Output")]
    output: String,
}

/// The worker's client-facing routes.
pub fn router<C: Clock>(worker: Arc<Worker<C>>) -> Router {
    Router::new()
        .route("/session", get(get_session::<C>).post(leave_session::<C>))
        .route("/recover", get(recover::<C>))
        .route("/execute", post(execute::<C>))
        .route("/ws", get(ws_upgrade::<C>))
        .with_state(worker)
}

async fn get_session<C: Clock>(
    State(worker): State<Arc<Worker<C>>>,
    Query(query): Query<SessionQuery>,
) -> impl IntoResponse {
    worker.load_session(&query.session_id).await;
    match worker.session_snapshot(&query.session_id) {
        Some((session, logs)) => {
            Json(SessionView { session, logs: logs.into_values().collect() }).into_response()
        }
        None => (StatusCode::NOT_FOUND, "unknown session").into_response(),
    }
}

async fn leave_session<C: Clock>(
    State(worker): State<Arc<Worker<C>>>,
    Query(query): Query<LeaveQuery>,
) -> StatusCode {
    worker.clients.leave(&query.session_id, &query.user_id);
    info!(session_id = %query.session_id, user_id = %query.user_id, "client left session");
    StatusCode::OK
}

async fn recover<C: Clock>(
    State(worker): State<Arc<Worker<C>>>,
    Query(query): Query<SessionQuery>,
) -> Json<RecoverView> {
    let cached_elements = worker.cache.lock().get(&query.session_id);
    let logs = worker
        .logs
        .lock()
        .get(&query.session_id)
        .cloned()
        .unwrap_or_default()
        .into_values()
        .collect();
    Json(RecoverView { cached_elements, logs })
}

async fn execute<C: Clock>(
    State(worker): State<Arc<Worker<C>>>,
    Form(form): Form<ExecuteForm>,
) -> impl IntoResponse {
    match worker.submit_job(&form.session_id, &form.snippet).await {
        Ok(job_id) => Json(ExecuteReply { job_id, output: String::new() }).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, format!("submit failed: {e}")).into_response(),
    }
}

async fn ws_upgrade<C: Clock>(
    State(worker): State<Arc<Worker<C>>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_socket(worker, socket, query.user_id, query.session_id))
}

async fn client_socket<C: Clock>(
    worker: Arc<Worker<C>>,
    socket: WebSocket,
    user_id: String,
    session_id: String,
) {
    worker.load_session(&session_id).await;
    let mut rx = worker.clients.register(&user_id, &session_id);
    info!(%user_id, %session_id, "client connected");

    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let Ok(payload) = serde_json::to_string(&message) else { continue };
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Insert { session_id, prev_id, text }) => {
                if let Err(e) = worker.local_insert(&session_id, &user_id, &prev_id, &text) {
                    warn!(%user_id, error = %e, "insert rejected");
                }
            }
            Ok(ClientMessage::Delete { session_id, id }) => {
                if let Err(e) = worker.local_delete(&session_id, &user_id, &id) {
                    warn!(%user_id, error = %e, "delete rejected");
                }
            }
            Err(e) => warn!(%user_id, error = %e, "malformed client message"),
        }
    }

    // Socket gone: the read loop only exits on close or error.
    worker.clients.remove(&user_id);
    writer.abort();
    info!(%user_id, "client disconnected");
}
