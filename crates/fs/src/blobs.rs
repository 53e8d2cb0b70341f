// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opaque blob persistence for one storage node.
//!
//! One file per session id under `session/`, one per job id under
//! `log/`. A save truncates and rewrites the whole blob; a get returns
//! the latest blob or nothing. The node's assigned id survives restarts
//! in a `nodeID` file next to the blob directories.

use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use golab_core::{Log, Session};
use thiserror::Error;

const SESSION_DIR: &str = "session";
const LOG_DIR: &str = "log";
const NODE_ID_FILE: &str = "nodeID";

/// Errors from blob persistence.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt blob {path}: {source}")]
    Corrupt { path: String, source: serde_json::Error },

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Blob store rooted at one directory.
pub struct BlobStore {
    base: PathBuf,
}

impl BlobStore {
    /// Open (creating if needed) the store's directory layout.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, BlobError> {
        let base = base.into();
        fs::create_dir_all(base.join(SESSION_DIR))?;
        fs::create_dir_all(base.join(LOG_DIR))?;
        Ok(BlobStore { base })
    }

    pub fn save_session(&self, session: &Session) -> Result<(), BlobError> {
        self.write_blob(self.base.join(SESSION_DIR).join(&session.id), session)
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, BlobError> {
        self.read_blob(self.base.join(SESSION_DIR).join(session_id))
    }

    pub fn save_log(&self, log: &Log) -> Result<(), BlobError> {
        self.write_blob(self.base.join(LOG_DIR).join(&log.job.job_id), log)
    }

    pub fn get_log(&self, job_id: &str) -> Result<Option<Log>, BlobError> {
        self.read_blob(self.base.join(LOG_DIR).join(job_id))
    }

    /// Node id remembered from a previous registration, if any.
    pub fn node_id(&self) -> Option<String> {
        let id = fs::read_to_string(self.base.join(NODE_ID_FILE)).ok()?;
        let id = id.trim().to_string();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub fn store_node_id(&self, node_id: &str) -> Result<(), BlobError> {
        let mut file = fs::File::create(self.base.join(NODE_ID_FILE))?;
        file.write_all(node_id.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn write_blob<T: serde::Serialize>(&self, path: PathBuf, value: &T) -> Result<(), BlobError> {
        let payload = serde_json::to_vec(value).map_err(BlobError::Encode)?;
        let mut file = fs::File::create(&path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        Ok(())
    }

    fn read_blob<T: serde::de::DeserializeOwned>(
        &self,
        path: PathBuf,
    ) -> Result<Option<T>, BlobError> {
        let payload = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_slice(&payload).map_err(|source| BlobError::Corrupt {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Some(value))
    }
}

#[cfg(test)]
#[path = "blobs_tests.rs"]
mod tests;
