// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snippet execution.
//!
//! The sandbox behind [`SnippetRunner`] is a collaborator: the worker
//! only cares that a snippet turns into captured stdout/stderr within
//! the wall-clock budget. [`GoRunner`] is the production on-host
//! implementation; [`FakeRunner`] scripts outcomes for tests.

use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::env;

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Path of the temp file the snippet ran from; compiler messages
    /// prefixed with it are stripped for display.
    pub file: String,
    pub timed_out: bool,
}

/// Seam to the on-host sandbox.
#[async_trait]
pub trait SnippetRunner: Send + Sync {
    async fn exec(&self, snippet: &str) -> RunOutcome;
}

/// Runs snippets with `go run` under the wall-clock budget.
pub struct GoRunner;

#[async_trait]
impl SnippetRunner for GoRunner {
    async fn exec(&self, snippet: &str) -> RunOutcome {
        let stamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let file = std::env::temp_dir().join(format!("golab_snippet_{}_{stamp}.go", std::process::id()));
        let file_str = file.display().to_string();

        if let Err(e) = tokio::fs::write(&file, snippet).await {
            return RunOutcome {
                stderr: format!("write snippet: {e}"),
                file: file_str,
                ..Default::default()
            };
        }

        let mut command = tokio::process::Command::new(env::go_bin());
        command.arg("run").arg(&file).stdin(Stdio::null()).kill_on_drop(true);

        // Dropping the output future on timeout kills the child.
        let result = tokio::time::timeout(env::snippet_timeout(), command.output()).await;
        let _ = tokio::fs::remove_file(&file).await;

        match result {
            Ok(Ok(output)) => RunOutcome {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                file: file_str,
                timed_out: false,
            },
            Ok(Err(e)) => RunOutcome {
                stderr: format!("run snippet: {e}"),
                file: file_str,
                ..Default::default()
            },
            Err(_) => RunOutcome { file: file_str, timed_out: true, ..Default::default() },
        }
    }
}

/// Pick the browser-visible output: stdout when the run was clean,
/// sliced stderr when the compiler or runtime complained, a fixed
/// message on timeout.
pub fn output_from(outcome: &RunOutcome) -> String {
    if outcome.timed_out {
        return "program timed out".to_string();
    }
    if outcome.stderr.is_empty() {
        return outcome.stdout.clone();
    }
    slice_stderr(&outcome.stderr, &outcome.file)
}

/// Drop the `# command-line-arguments` header and the temp-file path
/// prefix from compiler output.
fn slice_stderr(stderr: &str, file: &str) -> String {
    stderr
        .lines()
        .filter(|line| line.trim() != "# command-line-arguments")
        .map(|line| {
            line.strip_prefix(file)
                .map(|rest| rest.strip_prefix(':').unwrap_or(rest))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scripted runner for tests.
pub struct FakeRunner {
    outcome: Mutex<RunOutcome>,
    calls: AtomicUsize,
}

impl FakeRunner {
    pub fn new(outcome: RunOutcome) -> Arc<Self> {
        Arc::new(FakeRunner { outcome: Mutex::new(outcome), calls: AtomicUsize::new(0) })
    }

    /// A runner that always succeeds with `stdout`.
    pub fn stdout(stdout: &str) -> Arc<Self> {
        Self::new(RunOutcome { stdout: stdout.to_string(), ..Default::default() })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SnippetRunner for FakeRunner {
    async fn exec(&self, _snippet: &str) -> RunOutcome {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.outcome.lock().clone()
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
