//! Recipe types: recorded, replayable fill scripts for one ATS platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ats::AtsType;

/// One recorded DOM action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Type,
    Select,
    Click,
    Upload,
    Radio,
    Checkbox,
    Wait,
}

/// One step of a recipe, applied in order during replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeStep {
    pub action: StepAction,

    /// CSS selector the action targets (unused for `wait`)
    pub selector: String,

    /// Value template with `{{path.to.field}}` interpolation against the
    /// profile; for `wait` this is the duration in milliseconds
    #[serde(default)]
    pub value: Option<String>,

    /// Logical field name, for logging and fill accounting
    #[serde(default)]
    pub field_name: Option<String>,

    /// A required step failing aborts the replay; a non-required one is
    /// skipped with a warning
    #[serde(default)]
    pub required: bool,
}

impl RecipeStep {
    pub fn new(action: StepAction, selector: impl Into<String>) -> Self {
        Self {
            action,
            selector: selector.into(),
            value: None,
            field_name: None,
            required: false,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A reusable fill script for one ATS platform.
///
/// Created or updated only by an explicit recording action; read-only
/// during replay. Statistics are recomputed from execution records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,

    /// Unique platform key (`greenhouse`, `lever`, ...)
    pub platform: String,

    pub ats: AtsType,

    /// Ordered steps
    pub steps: Vec<RecipeStep>,

    /// Rolling success rate over executions, 0.0 to 1.0
    pub success_rate: f64,

    pub times_used: i64,

    pub last_used_at: Option<DateTime<Utc>>,

    /// Consecutive failed replays; three flags the recipe stale
    pub consecutive_failures: i32,

    /// Suppressed from replay until re-recorded
    pub stale: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipe {
    /// Failures in a row before a recipe is suppressed.
    pub const STALE_THRESHOLD: i32 = 3;

    pub fn new(ats: AtsType, steps: Vec<RecipeStep>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            platform: ats.as_str().to_string(),
            ats,
            steps,
            success_rate: 0.0,
            times_used: 0,
            last_used_at: None,
            consecutive_failures: 0,
            stale: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this recipe may be replayed.
    pub fn usable(&self) -> bool {
        !self.stale && !self.steps.is_empty()
    }

    /// Fold one execution outcome into the rolling statistics.
    pub fn record_outcome(&mut self, success: bool) {
        let total = self.times_used as f64;
        self.success_rate = (self.success_rate * total + if success { 1.0 } else { 0.0 })
            / (total + 1.0);
        self.times_used += 1;
        self.last_used_at = Some(Utc::now());
        self.updated_at = Utc::now();
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= Self::STALE_THRESHOLD {
                self.stale = true;
            }
        }
    }
}

/// Immutable audit record of one replay attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeExecution {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub success: bool,
    pub cost: f64,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Result of a successful replay pass.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    /// Steps that executed
    pub steps_run: usize,
    /// Non-required steps that were skipped with a warning
    pub steps_skipped: usize,
    /// Replay wall time
    pub duration_ms: i64,
    /// Screenshot bytes captured after the submit step, when available
    pub screenshot: Option<Vec<u8>>,
}

impl ReplayOutcome {
    /// Every required step ran; skips were all non-required.
    pub fn complete(&self) -> bool {
        self.steps_run > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_success_rate() {
        let mut recipe = Recipe::new(AtsType::Greenhouse, vec![]);
        recipe.record_outcome(true);
        recipe.record_outcome(true);
        recipe.record_outcome(false);
        assert!((recipe.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(recipe.times_used, 3);
        assert_eq!(recipe.consecutive_failures, 1);
        assert!(!recipe.stale);
    }

    #[test]
    fn three_consecutive_failures_flag_stale() {
        let mut recipe = Recipe::new(
            AtsType::Lever,
            vec![RecipeStep::new(StepAction::Click, "#submit")],
        );
        recipe.record_outcome(false);
        recipe.record_outcome(false);
        assert!(!recipe.stale);
        recipe.record_outcome(false);
        assert!(recipe.stale);
        assert!(!recipe.usable());
    }

    #[test]
    fn success_resets_failure_streak() {
        let mut recipe = Recipe::new(AtsType::Lever, vec![]);
        recipe.record_outcome(false);
        recipe.record_outcome(false);
        recipe.record_outcome(true);
        assert_eq!(recipe.consecutive_failures, 0);
        assert!(!recipe.stale);
    }

    #[test]
    fn step_schema_round_trips() {
        let step = RecipeStep::new(StepAction::Type, "[name=\"email\"]")
            .with_value("{{personal.email}}")
            .with_field_name("email")
            .required();
        let json = serde_json::to_string(&step).unwrap();
        let back: RecipeStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.action, StepAction::Type);
        assert!(back.required);
        assert_eq!(back.value.as_deref(), Some("{{personal.email}}"));
    }
}
