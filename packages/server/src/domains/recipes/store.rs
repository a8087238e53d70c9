use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use automation::types::{Recipe, RecipeExecution};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domains::applications::RecipeUpdate;

#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// The recipe workers should replay for a platform, if any.
    /// Stale recipes are never returned.
    async fn find_usable(&self, platform: &str) -> Result<Option<Recipe>>;

    async fn find(&self, id: Uuid) -> Result<Option<Recipe>>;

    /// Insert a newly recorded recipe.
    async fn insert(&self, recipe: &Recipe) -> Result<()>;

    /// Execution history for a recipe, most recent first.
    async fn executions(&self, recipe_id: Uuid) -> Result<Vec<RecipeExecution>>;
}

/// Database shape of a recipe. `steps` is JSONB and `ats` is the text
/// platform key, so the automation type needs a conversion layer.
#[derive(sqlx::FromRow)]
struct RecipeRow {
    id: Uuid,
    platform: String,
    ats: String,
    steps: serde_json::Value,
    success_rate: f64,
    times_used: i64,
    last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    consecutive_failures: i32,
    stale: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl RecipeRow {
    fn into_recipe(self) -> Result<Recipe> {
        Ok(Recipe {
            id: self.id,
            platform: self.platform,
            ats: self.ats.parse().unwrap_or_default(),
            steps: serde_json::from_value(self.steps)
                .context("failed to deserialize recipe steps")?,
            success_rate: self.success_rate,
            times_used: self.times_used,
            last_used_at: self.last_used_at,
            consecutive_failures: self.consecutive_failures,
            stale: self.stale,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecipeExecutionRow {
    id: Uuid,
    recipe_id: Uuid,
    success: bool,
    cost: f64,
    duration_ms: i64,
    error: Option<String>,
    executed_at: chrono::DateTime<chrono::Utc>,
}

impl From<RecipeExecutionRow> for RecipeExecution {
    fn from(row: RecipeExecutionRow) -> Self {
        RecipeExecution {
            id: row.id,
            recipe_id: row.recipe_id,
            success: row.success,
            cost: row.cost,
            duration_ms: row.duration_ms,
            error: row.error,
            executed_at: row.executed_at,
        }
    }
}

pub struct PostgresRecipeStore {
    pool: PgPool,
}

impl PostgresRecipeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipeStore for PostgresRecipeStore {
    async fn find_usable(&self, platform: &str) -> Result<Option<Recipe>> {
        let row = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT * FROM recipes
            WHERE platform = $1 AND stale = FALSE
            ORDER BY success_rate DESC, times_used DESC
            LIMIT 1
            "#,
        )
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch usable recipe")?;
        Ok(row
            .map(RecipeRow::into_recipe)
            .transpose()?
            .filter(|r| r.usable()))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Recipe>> {
        let row = sqlx::query_as::<_, RecipeRow>("SELECT * FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch recipe")?;
        row.map(RecipeRow::into_recipe).transpose()
    }

    async fn insert(&self, recipe: &Recipe) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recipes (
                id, platform, ats, steps, success_rate, times_used, last_used_at,
                consecutive_failures, stale, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(recipe.id)
        .bind(&recipe.platform)
        .bind(recipe.ats.as_str())
        .bind(serde_json::to_value(&recipe.steps).context("failed to serialize recipe steps")?)
        .bind(recipe.success_rate)
        .bind(recipe.times_used)
        .bind(recipe.last_used_at)
        .bind(recipe.consecutive_failures)
        .bind(recipe.stale)
        .bind(recipe.created_at)
        .bind(recipe.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert recipe")?;
        Ok(())
    }

    async fn executions(&self, recipe_id: Uuid) -> Result<Vec<RecipeExecution>> {
        let rows = sqlx::query_as::<_, RecipeExecutionRow>(
            "SELECT * FROM recipe_executions WHERE recipe_id = $1 ORDER BY executed_at DESC",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch recipe executions")?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Recipe state shared between the in-memory recipe store and the
/// in-memory application store, mirroring the single-database coupling
/// of the Postgres stores.
#[derive(Default, Clone)]
pub struct SharedRecipes {
    recipes: Arc<RwLock<HashMap<Uuid, Recipe>>>,
    executions: Arc<RwLock<Vec<RecipeExecution>>>,
}

impl SharedRecipes {
    pub fn apply_update(&self, update: &RecipeUpdate) {
        self.recipes
            .write()
            .unwrap()
            .insert(update.recipe.id, update.recipe.clone());
        self.executions.write().unwrap().push(update.execution.clone());
    }
}

#[derive(Default, Clone)]
pub struct MemoryRecipeStore {
    shared: SharedRecipes,
}

impl MemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shared(shared: SharedRecipes) -> Self {
        Self { shared }
    }

    pub fn shared(&self) -> SharedRecipes {
        self.shared.clone()
    }

    pub fn with_recipe(self, recipe: Recipe) -> Self {
        self.shared.recipes.write().unwrap().insert(recipe.id, recipe);
        self
    }
}

#[async_trait]
impl RecipeStore for MemoryRecipeStore {
    async fn find_usable(&self, platform: &str) -> Result<Option<Recipe>> {
        let map = self.shared.recipes.read().unwrap();
        Ok(map
            .values()
            .filter(|r| r.platform == platform && r.usable())
            .max_by(|a, b| a.success_rate.total_cmp(&b.success_rate))
            .cloned())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Recipe>> {
        Ok(self.shared.recipes.read().unwrap().get(&id).cloned())
    }

    async fn insert(&self, recipe: &Recipe) -> Result<()> {
        self.shared
            .recipes
            .write()
            .unwrap()
            .insert(recipe.id, recipe.clone());
        Ok(())
    }

    async fn executions(&self, recipe_id: Uuid) -> Result<Vec<RecipeExecution>> {
        let list = self.shared.executions.read().unwrap();
        let mut rows: Vec<_> = list
            .iter()
            .filter(|e| e.recipe_id == recipe_id)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }
}
