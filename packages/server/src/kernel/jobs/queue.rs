//! Durable job queue over Postgres.
//!
//! Enqueue is idempotent on the command's idempotency key; claiming uses
//! `FOR UPDATE SKIP LOCKED` so workers never contend on the same row, and
//! a lease timestamp lets crashed workers' jobs be reclaimed.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::job::{ApplyCommand, Job, JobPriority, JobStatus};

/// How long a claimed job stays leased before it can be reclaimed.
pub const LEASE_DURATION: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// A new job was created.
    Created(Job),
    /// A live job with the same idempotency key already exists.
    Duplicate(Job),
}

impl EnqueueResult {
    pub fn job(&self) -> &Job {
        match self {
            EnqueueResult::Created(job) | EnqueueResult::Duplicate(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a submission command. Returns `Duplicate` without creating
    /// anything when a non-terminal job with the same key exists.
    async fn enqueue(&self, command: &ApplyCommand, priority: JobPriority)
        -> Result<EnqueueResult>;

    /// Claim up to `limit` runnable jobs for `worker_id`.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>>;

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Record a failure. With `retry_in` set and retries remaining the job
    /// is rescheduled; otherwise it moves to the dead-letter state.
    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_kind: &str,
        error_message: &str,
        retry_in: Option<Duration>,
    ) -> Result<()>;

    /// Cancel the pending job with this idempotency key. Running and
    /// finished jobs are left alone; returns whether a row was cancelled.
    async fn cancel(&self, idempotency_key: &str) -> Result<bool>;

    /// Extend the lease on a running job.
    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<()>;
}

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        command: &ApplyCommand,
        priority: JobPriority,
    ) -> Result<EnqueueResult> {
        let key = command.idempotency_key();
        let args = serde_json::to_value(command).context("failed to serialize command")?;

        // The partial unique index on idempotency_key covers non-terminal
        // jobs only, so ON CONFLICT means a live duplicate.
        let inserted = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, job_type, args, status, priority, retry_count, max_retries,
                next_run_at, idempotency_key, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'pending', $4, 0, $5, NOW(), $6, NOW(), NOW())
            ON CONFLICT (idempotency_key) WHERE status IN ('pending', 'running')
            DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ApplyCommand::JOB_TYPE)
        .bind(&args)
        .bind(priority)
        .bind(5i32)
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .context("failed to enqueue job")?;

        if let Some(job) = inserted {
            return Ok(EnqueueResult::Created(job));
        }

        let existing = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE idempotency_key = $1 AND status IN ('pending', 'running')
            LIMIT 1
            "#,
        )
        .bind(&key)
        .fetch_one(&self.pool)
        .await
        .context("failed to fetch duplicate job")?;
        Ok(EnqueueResult::Duplicate(existing))
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            WITH claimable AS (
                SELECT id FROM jobs
                WHERE (status = 'pending' AND next_run_at <= NOW())
                   OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY priority DESC, next_run_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                worker_id = $1,
                lease_expires_at = NOW() + $3 * INTERVAL '1 second',
                updated_at = NOW()
            FROM claimable
            WHERE jobs.id = claimable.id
            RETURNING jobs.*
            "#,
        )
        .bind(worker_id)
        .bind(limit)
        .bind(LEASE_DURATION.as_secs() as f64)
        .fetch_all(&self.pool)
        .await
        .context("failed to claim jobs")?;
        Ok(jobs)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .context("failed to mark job succeeded")?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_kind: &str,
        error_message: &str,
        retry_in: Option<Duration>,
    ) -> Result<()> {
        match retry_in {
            Some(delay) => {
                let result = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'pending',
                        retry_count = retry_count + 1,
                        next_run_at = NOW() + $2 * INTERVAL '1 second',
                        lease_expires_at = NULL,
                        worker_id = NULL,
                        error_kind = $3,
                        error_message = $4,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'running'
                      AND retry_count < max_retries
                    "#,
                )
                .bind(job_id)
                .bind(delay.as_secs_f64())
                .bind(error_kind)
                .bind(error_message)
                .execute(&self.pool)
                .await
                .context("failed to reschedule job")?;

                // Retry budget exhausted at the queue level.
                if result.rows_affected() == 0 {
                    self.dead_letter(job_id, error_kind, error_message).await?;
                }
            }
            None => self.dead_letter(job_id, error_kind, error_message).await?,
        }
        Ok(())
    }

    async fn cancel(&self, idempotency_key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled', updated_at = NOW()
            WHERE idempotency_key = $1 AND status = 'pending'
            "#,
        )
        .bind(idempotency_key)
        .execute(&self.pool)
        .await
        .context("failed to cancel job")?;
        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + $3 * INTERVAL '1 second',
                updated_at = NOW()
            WHERE id = $1 AND worker_id = $2 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(worker_id)
        .bind(LEASE_DURATION.as_secs() as f64)
        .execute(&self.pool)
        .await
        .context("failed to extend job lease")?;
        Ok(())
    }
}

impl PostgresJobQueue {
    async fn dead_letter(&self, job_id: Uuid, error_kind: &str, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead_letter',
                error_kind = $2,
                error_message = $3,
                dead_lettered_at = NOW(),
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(error_kind)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("failed to dead-letter job")?;
        Ok(())
    }
}

/// In-memory queue with the same semantics, for worker and service tests.
#[derive(Default, Clone)]
pub struct MemoryJobQueue {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().unwrap().get(&id).cloned()
    }

    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<Job> {
        self.jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        command: &ApplyCommand,
        priority: JobPriority,
    ) -> Result<EnqueueResult> {
        let key = command.idempotency_key();
        let mut map = self.jobs.write().unwrap();
        if let Some(existing) = map
            .values()
            .find(|j| j.idempotency_key.as_deref() == Some(&key) && !j.status.is_terminal())
        {
            return Ok(EnqueueResult::Duplicate(existing.clone()));
        }
        let job = Job::builder()
            .args(serde_json::to_value(command).context("failed to serialize command")?)
            .priority(priority)
            .idempotency_key(key)
            .build();
        map.insert(job.id, job.clone());
        Ok(EnqueueResult::Created(job))
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<Job>> {
        let now = Utc::now();
        let mut map = self.jobs.write().unwrap();
        let mut runnable: Vec<Uuid> = map
            .values()
            .filter(|j| {
                (j.status == JobStatus::Pending && j.next_run_at <= now)
                    || (j.status == JobStatus::Running
                        && j.lease_expires_at.is_some_and(|at| at < now))
            })
            .map(|j| j.id)
            .collect();
        runnable.sort_by_key(|id| {
            let job = &map[id];
            (std::cmp::Reverse(job.priority), job.next_run_at)
        });
        runnable.truncate(limit.max(0) as usize);

        let mut claimed = Vec::with_capacity(runnable.len());
        for id in runnable {
            let job = map.get_mut(&id).unwrap();
            job.status = JobStatus::Running;
            job.worker_id = Some(worker_id.to_string());
            job.lease_expires_at = Some(now + chrono::Duration::from_std(LEASE_DURATION).unwrap());
            job.updated_at = now;
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        let mut map = self.jobs.write().unwrap();
        if let Some(job) = map.get_mut(&job_id) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Succeeded;
                job.lease_expires_at = None;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        error_kind: &str,
        error_message: &str,
        retry_in: Option<Duration>,
    ) -> Result<()> {
        let mut map = self.jobs.write().unwrap();
        let Some(job) = map.get_mut(&job_id) else {
            return Ok(());
        };
        if job.status != JobStatus::Running {
            return Ok(());
        }
        job.error_kind = Some(error_kind.to_string());
        job.error_message = Some(error_message.to_string());
        job.lease_expires_at = None;
        job.updated_at = Utc::now();
        match retry_in {
            Some(delay) if job.should_retry() => {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.worker_id = None;
                job.next_run_at = Utc::now() + chrono::Duration::from_std(delay).unwrap();
            }
            _ => {
                job.status = JobStatus::DeadLetter;
                job.dead_lettered_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn cancel(&self, idempotency_key: &str) -> Result<bool> {
        let mut map = self.jobs.write().unwrap();
        for job in map.values_mut() {
            if job.idempotency_key.as_deref() == Some(idempotency_key)
                && job.status == JobStatus::Pending
            {
                job.status = JobStatus::Cancelled;
                job.updated_at = Utc::now();
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn heartbeat(&self, job_id: Uuid, worker_id: &str) -> Result<()> {
        let mut map = self.jobs.write().unwrap();
        if let Some(job) = map.get_mut(&job_id) {
            if job.status == JobStatus::Running && job.worker_id.as_deref() == Some(worker_id) {
                job.lease_expires_at =
                    Some(Utc::now() + chrono::Duration::from_std(LEASE_DURATION).unwrap());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> ApplyCommand {
        ApplyCommand {
            application_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            job_url: "https://boards.greenhouse.io/acme/jobs/1".into(),
            ats: "greenhouse".into(),
        }
    }

    #[tokio::test]
    async fn enqueue_deduplicates_live_jobs() {
        let queue = MemoryJobQueue::new();
        let cmd = command();
        let first = queue.enqueue(&cmd, JobPriority::Normal).await.unwrap();
        assert!(first.is_created());

        let second = queue.enqueue(&cmd, JobPriority::Normal).await.unwrap();
        assert!(!second.is_created());
        assert_eq!(second.job().id, first.job().id);
    }

    #[tokio::test]
    async fn terminal_job_allows_re_enqueue() {
        let queue = MemoryJobQueue::new();
        let cmd = command();
        let first = queue.enqueue(&cmd, JobPriority::Normal).await.unwrap();
        queue.claim("w1", 1).await.unwrap();
        queue.mark_succeeded(first.job().id).await.unwrap();

        let second = queue.enqueue(&cmd, JobPriority::Normal).await.unwrap();
        assert!(second.is_created());
        assert_ne!(second.job().id, first.job().id);
    }

    #[tokio::test]
    async fn claim_respects_priority_and_limit() {
        let queue = MemoryJobQueue::new();
        let low = queue.enqueue(&command(), JobPriority::Low).await.unwrap();
        let high = queue.enqueue(&command(), JobPriority::High).await.unwrap();

        let claimed = queue.claim("w1", 1).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, high.job().id);
        assert_eq!(claimed[0].worker_id.as_deref(), Some("w1"));

        let rest = queue.claim("w2", 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, low.job().id);
    }

    #[tokio::test]
    async fn failed_job_reschedules_then_dead_letters() {
        let queue = MemoryJobQueue::new();
        let created = queue.enqueue(&command(), JobPriority::Normal).await.unwrap();
        let id = created.job().id;

        queue.claim("w1", 1).await.unwrap();
        queue
            .mark_failed(id, "network_timeout", "request timed out", Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(queue.job(id).unwrap().status, JobStatus::Pending);
        assert_eq!(queue.job(id).unwrap().retry_count, 1);

        queue.claim("w1", 1).await.unwrap();
        queue
            .mark_failed(id, "captcha_unsolvable", "image captcha", None)
            .await
            .unwrap();
        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert!(job.dead_lettered_at.is_some());
        assert_eq!(job.error_kind.as_deref(), Some("captcha_unsolvable"));
    }

    #[tokio::test]
    async fn cancel_only_touches_pending_jobs() {
        let queue = MemoryJobQueue::new();
        let cmd = command();
        let created = queue.enqueue(&cmd, JobPriority::Normal).await.unwrap();
        let key = cmd.idempotency_key();

        assert!(queue.cancel(&key).await.unwrap());
        assert_eq!(queue.job(created.job().id).unwrap().status, JobStatus::Cancelled);

        // Once running, cancel is a no-op.
        let cmd2 = command();
        queue.enqueue(&cmd2, JobPriority::Normal).await.unwrap();
        queue.claim("w1", 1).await.unwrap();
        assert!(!queue.cancel(&cmd2.idempotency_key()).await.unwrap());
    }
}
