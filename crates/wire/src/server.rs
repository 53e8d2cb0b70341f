// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC accept loop shared by every daemon.
//!
//! Spawns one task per connection; each task reads framed requests
//! until the peer disconnects and answers each with the handler's
//! response. Handlers receive the process-scoped service object.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error};

use crate::frame::{decode, read_message, write_value, ProtocolError};

/// Run the accept loop forever.
pub async fn serve<S, Req, Resp, F, Fut>(listener: TcpListener, service: Arc<S>, handle: F)
where
    S: Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + Sync + 'static,
    F: Fn(Arc<S>, Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Resp> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "new connection");
                let service = Arc::clone(&service);
                let handle = handle.clone();
                tokio::spawn(async move {
                    match handle_connection(stream, service, handle).await {
                        Ok(()) | Err(ProtocolError::ConnectionClosed) => {
                            debug!(%addr, "connection closed")
                        }
                        Err(e) => error!(%addr, error = %e, "connection error"),
                    }
                });
            }
            Err(e) => error!("accept error: {}", e),
        }
    }
}

async fn handle_connection<S, Req, Resp, F, Fut>(
    stream: TcpStream,
    service: Arc<S>,
    handle: F,
) -> Result<(), ProtocolError>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: Fn(Arc<S>, Req) -> Fut,
    Fut: Future<Output = Resp>,
{
    let (mut reader, mut writer) = stream.into_split();
    loop {
        // Idle persistent connections are expected; no read timeout here.
        let payload = read_message(&mut reader).await?;
        let request: Req = decode(&payload)?;
        let response = handle(Arc::clone(&service), request).await;
        write_value(&mut writer, &response).await?;
    }
}
