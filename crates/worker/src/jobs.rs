// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job submission, execution, and log delivery.

use std::sync::Arc;
use std::time::Duration;

use golab_core::{job_id, Clock, Log};
use golab_wire::balancer::{LbRequest, LbResponse};
use golab_wire::fs::{FsRequest, FsResponse};
use tracing::{info, warn};

use crate::clients::ServerMessage;
use crate::runner::output_from;
use crate::state::{Worker, WorkerError};

const LOG_FETCH_RETRY: Duration = Duration::from_millis(250);
const LOG_FETCH_ATTEMPTS: usize = 40;

impl<C: Clock> Worker<C> {
    /// `/execute` path: write the pending log through the FS server,
    /// answer the browser with the job id, and hand the job to the
    /// load balancer off the request path.
    pub async fn submit_job(self: &Arc<Self>, session_id: &str, snippet: &str) -> Result<String, WorkerError> {
        let job_id = job_id(session_id, self.clock.epoch_secs());
        let log = Log::pending(session_id, &job_id, snippet);
        match self.fs.call::<_, FsResponse>(&FsRequest::SaveLog { log }).await? {
            FsResponse::Started => {}
            _ => return Err(WorkerError::UnexpectedResponse("fs server")),
        }
        info!(%job_id, %session_id, "job submitted");

        let worker = Arc::clone(self);
        let dispatched = job_id.clone();
        tokio::spawn(async move {
            let request = LbRequest::NewJob {
                job_id: dispatched.clone(),
                origin_worker_id: worker.settings.worker_id,
            };
            // The load balancer broadcasts the finished log to every
            // worker, this one included; nothing more to do here.
            if let Err(e) = worker.lb.call::<_, LbResponse>(&request).await {
                warn!(job_id = %dispatched, error = %e, "job dispatch failed");
            }
        });
        Ok(job_id)
    }

    /// Execute a job on behalf of the load balancer. Fetches the log
    /// from the FS server (retrying while replication catches up),
    /// runs the snippet unless a previous attempt already finished,
    /// and writes the final log back.
    pub async fn run_job(&self, job_id: &str) -> Option<Log> {
        let mut log = self.fetch_log(job_id).await?;
        if log.job.done {
            // Run-at-most-once: replays return the stored log.
            return Some(log);
        }

        info!(%job_id, "running snippet");
        let outcome = self.runner.exec(&log.job.snippet).await;
        log.output = output_from(&outcome);
        log.job.done = true;

        match self.fs.call::<_, FsResponse>(&FsRequest::SaveLog { log: log.clone() }).await {
            Ok(FsResponse::Started) => {}
            Ok(_) | Err(_) => warn!(%job_id, "final log write-back failed"),
        }
        Some(log)
    }

    /// Install a finished log broadcast by the load balancer and push
    /// it to the session's local clients.
    pub fn send_log(&self, log: Log) {
        let session_id = log.job.session_id.clone();
        self.logs
            .lock()
            .entry(session_id.clone())
            .or_default()
            .insert(log.job.job_id.clone(), log.clone());
        self.clients.broadcast(&session_id, &ServerMessage::Log { log }, None);
    }

    async fn fetch_log(&self, job_id: &str) -> Option<Log> {
        for _ in 0..LOG_FETCH_ATTEMPTS {
            let request = FsRequest::GetLog { job_id: job_id.to_string() };
            match self.fs.call::<_, FsResponse>(&request).await {
                Ok(FsResponse::Log { log: Some(log) }) => return Some(log),
                Ok(_) => {}
                Err(e) => warn!(%job_id, error = %e, "log fetch failed"),
            }
            tokio::time::sleep(LOG_FETCH_RETRY).await;
        }
        warn!(%job_id, "log never appeared, giving up");
        None
    }
}
