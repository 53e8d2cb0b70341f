// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent RPC client.
//!
//! One TCP connection per peer; calls are serialized over it and each
//! call reads exactly one response. Any transport error is surfaced to
//! the caller, which is expected to drop the client and evict the peer.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::frame::{read_value, write_value, ProtocolError};

/// Response read timeout for a single call.
pub fn rpc_timeout() -> Duration {
    std::env::var("GOLAB_RPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// A client connection to one remote service.
pub struct RpcClient {
    addr: String,
    stream: Mutex<TcpStream>,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(RpcClient { addr: addr.to_string(), stream: Mutex::new(stream) })
    }

    /// Address this client dialled.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Issue one request and wait for its response.
    pub async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp, ProtocolError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let mut stream = self.stream.lock().await;
        write_value(&mut *stream, request).await?;
        read_value(&mut *stream, rpc_timeout()).await
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("addr", &self.addr).finish()
    }
}
