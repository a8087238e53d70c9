//! Read-only collaborators owned by other services.
//!
//! Profile and job-posting data live outside this service; workers only
//! read them. The traits here are the seam, with in-memory fakes for
//! tests. Production wiring points at the owning services' databases.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use automation::types::UserProfile;
use sqlx::PgPool;
use uuid::Uuid;

/// Candidate profile plus the credit balance that gates paid attempts.
#[derive(Debug, Clone)]
pub struct CandidateProfile {
    pub profile: UserProfile,
    pub credits: i64,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<CandidateProfile>>;
}

/// A job posting as the aggregator service knows it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobPosting {
    pub id: Uuid,
    pub url: String,
    pub description: String,
    pub open: bool,
}

#[async_trait]
pub trait JobPostingStore: Send + Sync {
    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobPosting>>;
}

/// Reads the profile mirror the owning service syncs into our database.
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<CandidateProfile>> {
        let row: Option<(serde_json::Value, i64)> = sqlx::query_as(
            "SELECT profile, credits FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch user profile")?;

        row.map(|(profile, credits)| {
            let profile: UserProfile =
                serde_json::from_value(profile).context("failed to deserialize user profile")?;
            Ok(CandidateProfile { profile, credits })
        })
        .transpose()
    }
}

pub struct PostgresJobPostingStore {
    pool: PgPool,
}

impl PostgresJobPostingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobPostingStore for PostgresJobPostingStore {
    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobPosting>> {
        let row = sqlx::query_as::<_, JobPosting>(
            "SELECT id, url, description, open FROM job_postings WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch job posting")?;
        Ok(row)
    }
}

#[derive(Default, Clone)]
pub struct MemoryProfileStore {
    profiles: Arc<RwLock<HashMap<Uuid, CandidateProfile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, user_id: Uuid, profile: UserProfile) -> Self {
        self.with_funded_profile(user_id, profile, 100)
    }

    pub fn with_funded_profile(self, user_id: Uuid, profile: UserProfile, credits: i64) -> Self {
        self.profiles
            .write()
            .unwrap()
            .insert(user_id, CandidateProfile { profile, credits });
        self
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn fetch(&self, user_id: Uuid) -> Result<Option<CandidateProfile>> {
        Ok(self.profiles.read().unwrap().get(&user_id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct MemoryJobPostingStore {
    postings: Arc<RwLock<HashMap<Uuid, JobPosting>>>,
}

impl MemoryJobPostingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posting(self, posting: JobPosting) -> Self {
        self.postings.write().unwrap().insert(posting.id, posting);
        self
    }
}

#[async_trait]
impl JobPostingStore for MemoryJobPostingStore {
    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobPosting>> {
        Ok(self.postings.read().unwrap().get(&job_id).cloned())
    }
}
