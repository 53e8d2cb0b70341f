// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs and their execution logs.

use serde::{Deserialize, Serialize};

/// A snippet submitted for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub session_id: String,
    pub job_id: String,
    pub snippet: String,
    /// Set once an execution attempt has completed; terminal.
    pub done: bool,
}

/// A job together with the output of its run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub job: Job,
    pub output: String,
}

impl Log {
    /// A freshly submitted, not-yet-run job.
    pub fn pending(session_id: impl Into<String>, job_id: impl Into<String>, snippet: impl Into<String>) -> Self {
        Log {
            job: Job {
                session_id: session_id.into(),
                job_id: job_id.into(),
                snippet: snippet.into(),
                done: false,
            },
            output: String::new(),
        }
    }
}

/// Job ids concatenate the session id and the submission time in
/// wall-clock seconds, so they sort by submission within a session.
pub fn job_id(session_id: &str, epoch_secs: u64) -> String {
    format!("{session_id}-{epoch_secs}")
}
