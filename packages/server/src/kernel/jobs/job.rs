//! Queue job row and the command payload it carries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Lifecycle of a queue job. Separate from the application status: a job
/// is one delivery attempt series, the application is the domain record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::DeadLetter | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// The submission command a worker executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplyCommand {
    pub application_id: Uuid,
    pub user_id: Uuid,
    pub job_id: Uuid,
    pub job_url: String,
    pub ats: String,
}

impl ApplyCommand {
    pub const JOB_TYPE: &'static str = "application:apply";

    /// Deduplication key: one live queue job per (user, job) pair.
    pub fn idempotency_key(&self) -> String {
        format!("apply:{}:{}", self.user_id, self.job_id)
    }
}

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    #[builder(default = ApplyCommand::JOB_TYPE.to_string())]
    pub job_type: String,

    /// Serialized [`ApplyCommand`]
    pub args: serde_json::Value,

    #[builder(default)]
    pub status: JobStatus,

    #[builder(default)]
    pub priority: JobPriority,

    #[builder(default = 0)]
    pub retry_count: i32,

    #[builder(default = 5)]
    pub max_retries: i32,

    #[builder(default = Utc::now())]
    pub next_run_at: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default, setter(strip_option))]
    pub error_kind: Option<String>,

    #[builder(default, setter(strip_option))]
    pub dead_lettered_at: Option<DateTime<Utc>>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn command(&self) -> serde_json::Result<ApplyCommand> {
        serde_json::from_value(self.args.clone())
    }

    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_stable_per_user_job() {
        let user_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();
        let a = ApplyCommand {
            application_id: Uuid::new_v4(),
            user_id,
            job_id,
            job_url: "https://boards.greenhouse.io/acme/jobs/1".into(),
            ats: "greenhouse".into(),
        };
        let b = ApplyCommand {
            application_id: Uuid::new_v4(),
            ..a.clone()
        };
        assert_eq!(a.idempotency_key(), b.idempotency_key());
    }

    #[test]
    fn command_round_trips_through_args() {
        let cmd = ApplyCommand {
            application_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            job_url: "https://jobs.lever.co/acme/2".into(),
            ats: "lever".into(),
        };
        let job = Job::builder()
            .args(serde_json::to_value(&cmd).unwrap())
            .idempotency_key(cmd.idempotency_key())
            .build();
        assert_eq!(job.command().unwrap(), cmd);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.should_retry());
    }
}
