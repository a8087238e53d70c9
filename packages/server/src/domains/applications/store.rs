use anyhow::{Context, Result};
use async_trait::async_trait;
use automation::types::{Recipe, RecipeExecution};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::model::{Application, ApplicationStatus, ApplyMethod};

/// Recipe statistics folded in memory by the worker, written alongside the
/// application outcome so the two never diverge.
#[derive(Debug, Clone)]
pub struct RecipeUpdate {
    pub recipe: Recipe,
    pub execution: RecipeExecution,
}

#[derive(Debug, Clone)]
pub enum OutcomeKind {
    Submitted {
        method: ApplyMethod,
        confirmation_id: String,
        screenshot_path: Option<String>,
    },
    Retry {
        error_kind: String,
        error_message: String,
    },
    Failed {
        error_kind: String,
        error_message: String,
    },
}

/// Terminal (or retry) result of one worker attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub application_id: Uuid,
    pub kind: OutcomeKind,
    /// Cost incurred by this attempt, added to the running total
    pub cost: f64,
    pub recipe: Option<RecipeUpdate>,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn create(&self, application: &Application) -> Result<Application>;

    async fn find(&self, id: Uuid) -> Result<Option<Application>>;

    /// Most recent application for this (user, job) pair.
    async fn find_for_user_job(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Application>>;

    /// `QUEUED|RETRYING → APPLYING`. Returns the updated row, or `None`
    /// when the application is not in a claimable state.
    async fn mark_applying(&self, id: Uuid) -> Result<Option<Application>>;

    /// `QUEUED → CANCELLED`. Returns false when the application had
    /// already left `QUEUED`.
    async fn cancel_if_queued(&self, id: Uuid) -> Result<bool>;

    /// Write status, cost, error fields, confirmation artifacts and any
    /// recipe statistics atomically.
    async fn persist_outcome(&self, outcome: &AttemptOutcome) -> Result<()>;
}

pub struct PostgresApplicationStore {
    pool: PgPool,
}

impl PostgresApplicationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PostgresApplicationStore {
    async fn create(&self, application: &Application) -> Result<Application> {
        let row = sqlx::query_as::<_, Application>(
            r#"
            INSERT INTO applications (
                id, user_id, job_id, job_url, ats, status, cost, retry_count,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(application.id)
        .bind(application.user_id)
        .bind(application.job_id)
        .bind(&application.job_url)
        .bind(&application.ats)
        .bind(application.status)
        .bind(application.cost)
        .bind(application.retry_count)
        .bind(application.created_at)
        .bind(application.updated_at)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert application")?;
        Ok(row)
    }

    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, Application>("SELECT * FROM applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch application")?;
        Ok(row)
    }

    async fn find_for_user_job(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, Application>(
            r#"
            SELECT * FROM applications
            WHERE user_id = $1 AND job_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch application for user/job")?;
        Ok(row)
    }

    async fn mark_applying(&self, id: Uuid) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, Application>(
            r#"
            UPDATE applications
            SET status = 'applying',
                started_at = COALESCE(started_at, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'retrying')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to mark application applying")?;
        Ok(row)
    }

    async fn cancel_if_queued(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET status = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to cancel application")?;
        Ok(result.rows_affected() > 0)
    }

    async fn persist_outcome(&self, outcome: &AttemptOutcome) -> Result<()> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        // Bounded lock wait so a stuck row surfaces as an error instead of
        // wedging the worker.
        sqlx::query("SET LOCAL lock_timeout = '2s'")
            .execute(&mut *tx)
            .await
            .context("failed to set lock timeout")?;

        match &outcome.kind {
            OutcomeKind::Submitted {
                method,
                confirmation_id,
                screenshot_path,
            } => {
                sqlx::query(
                    r#"
                    UPDATE applications
                    SET status = 'submitted',
                        method = $2,
                        cost = cost + $3,
                        confirmation_id = $4,
                        confirmation_screenshot = $5,
                        error_kind = NULL,
                        error_message = NULL,
                        submitted_at = NOW(),
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'applying'
                    "#,
                )
                .bind(outcome.application_id)
                .bind(method)
                .bind(outcome.cost)
                .bind(confirmation_id)
                .bind(screenshot_path)
                .execute(&mut *tx)
                .await
                .context("failed to mark application submitted")?;
            }
            OutcomeKind::Retry {
                error_kind,
                error_message,
            } => {
                sqlx::query(
                    r#"
                    UPDATE applications
                    SET status = 'retrying',
                        retry_count = retry_count + 1,
                        cost = cost + $2,
                        error_kind = $3,
                        error_message = $4,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'applying'
                    "#,
                )
                .bind(outcome.application_id)
                .bind(outcome.cost)
                .bind(error_kind)
                .bind(error_message)
                .execute(&mut *tx)
                .await
                .context("failed to mark application retrying")?;
            }
            OutcomeKind::Failed {
                error_kind,
                error_message,
            } => {
                sqlx::query(
                    r#"
                    UPDATE applications
                    SET status = 'failed',
                        cost = cost + $2,
                        error_kind = $3,
                        error_message = $4,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'applying'
                    "#,
                )
                .bind(outcome.application_id)
                .bind(outcome.cost)
                .bind(error_kind)
                .bind(error_message)
                .execute(&mut *tx)
                .await
                .context("failed to mark application failed")?;
            }
        }

        if let Some(update) = &outcome.recipe {
            let recipe = &update.recipe;
            sqlx::query(
                r#"
                UPDATE recipes
                SET success_rate = $2,
                    times_used = $3,
                    last_used_at = $4,
                    consecutive_failures = $5,
                    stale = $6,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(recipe.id)
            .bind(recipe.success_rate)
            .bind(recipe.times_used)
            .bind(recipe.last_used_at)
            .bind(recipe.consecutive_failures)
            .bind(recipe.stale)
            .execute(&mut *tx)
            .await
            .context("failed to update recipe statistics")?;

            let execution = &update.execution;
            sqlx::query(
                r#"
                INSERT INTO recipe_executions (
                    id, recipe_id, success, cost, duration_ms, error, executed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(execution.id)
            .bind(execution.recipe_id)
            .bind(execution.success)
            .bind(execution.cost)
            .bind(execution.duration_ms)
            .bind(&execution.error)
            .bind(execution.executed_at)
            .execute(&mut *tx)
            .await
            .context("failed to insert recipe execution")?;
        }

        tx.commit().await.context("failed to commit application outcome")?;
        Ok(())
    }
}

/// In-memory store for tests. Shares recipe state with
/// [`MemoryRecipeStore`](crate::domains::recipes::MemoryRecipeStore) so
/// `persist_outcome` can write both sides like the Postgres store does.
#[derive(Default, Clone)]
pub struct MemoryApplicationStore {
    applications: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<Uuid, Application>>>,
    recipes: crate::domains::recipes::SharedRecipes,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store whose recipe writes land in `recipes`.
    pub fn with_recipes(recipes: crate::domains::recipes::SharedRecipes) -> Self {
        Self {
            applications: Default::default(),
            recipes,
        }
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn create(&self, application: &Application) -> Result<Application> {
        let mut map = self.applications.write().unwrap();
        map.insert(application.id, application.clone());
        Ok(application.clone())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Application>> {
        Ok(self.applications.read().unwrap().get(&id).cloned())
    }

    async fn find_for_user_job(&self, user_id: Uuid, job_id: Uuid) -> Result<Option<Application>> {
        let map = self.applications.read().unwrap();
        Ok(map
            .values()
            .filter(|a| a.user_id == user_id && a.job_id == job_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn mark_applying(&self, id: Uuid) -> Result<Option<Application>> {
        let mut map = self.applications.write().unwrap();
        match map.get_mut(&id) {
            Some(app) if app.status.is_claimable() => {
                app.status = ApplicationStatus::Applying;
                app.started_at.get_or_insert_with(Utc::now);
                app.updated_at = Utc::now();
                Ok(Some(app.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_if_queued(&self, id: Uuid) -> Result<bool> {
        let mut map = self.applications.write().unwrap();
        match map.get_mut(&id) {
            Some(app) if app.status == ApplicationStatus::Queued => {
                app.status = ApplicationStatus::Cancelled;
                app.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn persist_outcome(&self, outcome: &AttemptOutcome) -> Result<()> {
        {
            let mut map = self.applications.write().unwrap();
            let app = map
                .get_mut(&outcome.application_id)
                .context("application not found")?;
            app.cost += outcome.cost;
            app.updated_at = Utc::now();
            match &outcome.kind {
                OutcomeKind::Submitted {
                    method,
                    confirmation_id,
                    screenshot_path,
                } => {
                    app.status = ApplicationStatus::Submitted;
                    app.method = Some(*method);
                    app.confirmation_id = Some(confirmation_id.clone());
                    app.confirmation_screenshot = screenshot_path.clone();
                    app.error_kind = None;
                    app.error_message = None;
                    app.submitted_at = Some(Utc::now());
                }
                OutcomeKind::Retry {
                    error_kind,
                    error_message,
                } => {
                    app.status = ApplicationStatus::Retrying;
                    app.retry_count += 1;
                    app.error_kind = Some(error_kind.clone());
                    app.error_message = Some(error_message.clone());
                }
                OutcomeKind::Failed {
                    error_kind,
                    error_message,
                } => {
                    app.status = ApplicationStatus::Failed;
                    app.error_kind = Some(error_kind.clone());
                    app.error_message = Some(error_message.clone());
                }
            }
        }

        if let Some(update) = &outcome.recipe {
            self.recipes.apply_update(update);
        }
        Ok(())
    }
}
