//! Fixed pool of queue workers.
//!
//! Each worker claims one job at a time, keeps its lease alive with a
//! heartbeat task while the runner executes, and reports the decision
//! back to the queue. Shutdown is cooperative: workers stop claiming and
//! finish their in-flight job within a grace period.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::job::Job;
use super::queue::JobQueue;
use crate::kernel::runner::{ApplicationRunner, RunDecision};

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    /// Sleep between empty claim attempts
    pub poll_interval: Duration,
    /// Lease extension cadence while a job runs
    pub heartbeat_interval: Duration,
    /// How long shutdown waits for in-flight jobs
    pub shutdown_grace: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            poll_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    runner: Arc<ApplicationRunner>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        runner: Arc<ApplicationRunner>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            queue,
            runner,
            config,
        }
    }

    /// Run the pool until `shutdown` fires, then drain.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut workers = JoinSet::new();
        for _ in 0..self.config.worker_count.max(1) {
            let worker = JobWorker {
                queue: self.queue.clone(),
                runner: self.runner.clone(),
                config: self.config.clone(),
                worker_id: format!("worker-{}", Uuid::new_v4()),
            };
            let token = shutdown.clone();
            workers.spawn(async move { worker.run(token).await });
        }

        shutdown.cancelled().await;
        info!(grace_secs = self.config.shutdown_grace.as_secs(), "draining workers");

        if tokio::time::timeout(self.config.shutdown_grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_err()
        {
            warn!("shutdown grace elapsed, aborting remaining workers");
            workers.abort_all();
        }
        Ok(())
    }
}

struct JobWorker {
    queue: Arc<dyn JobQueue>,
    runner: Arc<ApplicationRunner>,
    config: WorkerPoolConfig,
    worker_id: String,
}

impl JobWorker {
    async fn run(&self, shutdown: CancellationToken) {
        info!(worker_id = %self.worker_id, "worker started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let jobs = match self.queue.claim(&self.worker_id, 1).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "claim failed");
                    Vec::new()
                }
            };

            if jobs.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
                continue;
            }

            for job in jobs {
                self.process(job).await;
            }
        }
        info!(worker_id = %self.worker_id, "worker stopped");
    }

    async fn process(&self, job: Job) {
        let command = match job.command() {
            Ok(command) => command,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "undecodable job args");
                if let Err(e) = self
                    .queue
                    .mark_failed(job.id, "server_error", "undecodable job payload", None)
                    .await
                {
                    error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                }
                return;
            }
        };

        let heartbeat = self.spawn_heartbeat(job.id);
        let decision = self.runner.run(&command).await;
        heartbeat.abort();

        let report = match decision {
            Ok(RunDecision::Completed) | Ok(RunDecision::Skipped) => {
                self.queue.mark_succeeded(job.id).await
            }
            Ok(RunDecision::Retry {
                kind,
                message,
                delay,
            }) => {
                self.queue
                    .mark_failed(job.id, kind.as_str(), &message, Some(delay))
                    .await
            }
            Ok(RunDecision::Failed { kind, message }) => {
                self.queue
                    .mark_failed(job.id, kind.as_str(), &message, None)
                    .await
            }
            // Infrastructure fault (store unreachable, etc.): let the
            // queue retry on its own backoff.
            Err(e) => {
                error!(job_id = %job.id, error = %e, "runner failed");
                self.queue
                    .mark_failed(
                        job.id,
                        "server_error",
                        &e.to_string(),
                        Some(Duration::from_secs(30)),
                    )
                    .await
            }
        };

        if let Err(e) = report {
            error!(job_id = %job.id, error = %e, "failed to report job outcome");
        }
    }

    fn spawn_heartbeat(&self, job_id: Uuid) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let worker_id = self.worker_id.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = queue.heartbeat(job_id, &worker_id).await {
                    warn!(job_id = %job_id, error = %e, "heartbeat failed");
                }
            }
        })
    }
}
