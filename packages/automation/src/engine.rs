//! Recipe replay engine.
//!
//! Replays a recorded fill script for one ATS platform as the cheaper
//! alternative to AI extraction and filling. Steps run strictly in order;
//! each step's value template is interpolated against the profile before
//! the DOM action executes. A `required` step whose selector fails to
//! resolve aborts the replay with a stale-selector error so the caller
//! can fall back to the AI path; a non-required step failure is skipped
//! with a warning.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{AutomationError, Result};
use crate::traits::browser::BrowserPage;
use crate::types::profile::UserProfile;
use crate::types::recipe::{Recipe, RecipeStep, ReplayOutcome, StepAction};

fn template_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap())
}

/// Interpolate `{{path.to.field}}` markers against the profile. Paths
/// resolve through the profile document first, then the pre-answered map
/// (by raw key). An unresolved path is an error so a recipe never types a
/// literal template into a form.
pub fn interpolate(template: &str, profile: &UserProfile) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut last = 0;

    for caps in template_regex().captures_iter(template) {
        let whole = caps.get(0).unwrap();
        let path = &caps[1];

        result.push_str(&template[last..whole.start()]);

        let value = profile
            .lookup(path)
            .or_else(|| profile.pre_answered.get(path).cloned())
            .or_else(|| {
                (path == "resume_path")
                    .then(|| profile.resume_path.clone())
                    .flatten()
            })
            .ok_or_else(|| AutomationError::TemplatePath {
                path: path.to_string(),
            })?;

        result.push_str(&value);
        last = whole.end();
    }

    result.push_str(&template[last..]);
    Ok(result)
}

/// Replays recipes against a live page.
#[derive(Debug, Clone, Default)]
pub struct RecipeEngine {
    /// Upper bound honored for `wait` steps.
    max_wait_ms: u64,
}

impl RecipeEngine {
    pub fn new() -> Self {
        Self { max_wait_ms: 10_000 }
    }

    pub fn with_max_wait_ms(mut self, max_wait_ms: u64) -> Self {
        self.max_wait_ms = max_wait_ms;
        self
    }

    /// Replay a recipe. The recipe itself is read-only here; callers
    /// record the execution and fold statistics afterwards.
    pub async fn replay(
        &self,
        page: &dyn BrowserPage,
        recipe: &Recipe,
        profile: &UserProfile,
    ) -> Result<ReplayOutcome> {
        let started = std::time::Instant::now();
        let mut steps_run = 0usize;
        let mut steps_skipped = 0usize;

        for (index, step) in recipe.steps.iter().enumerate() {
            match self.run_step(page, step, profile).await {
                Ok(()) => {
                    debug!(platform = %recipe.platform, index, action = ?step.action, "step ok");
                    steps_run += 1;
                }
                Err(e) if step.required => {
                    info!(
                        platform = %recipe.platform,
                        index,
                        selector = %step.selector,
                        error = %e,
                        "required step failed, aborting replay"
                    );
                    // A required step that cannot find its element means the
                    // recording no longer matches the page.
                    return Err(match e {
                        AutomationError::Browser(crate::error::BrowserError::SelectorNotFound {
                            selector,
                        }) => AutomationError::RecipeSelectorStale { selector },
                        other => other,
                    });
                }
                Err(e) => {
                    warn!(
                        platform = %recipe.platform,
                        index,
                        selector = %step.selector,
                        error = %e,
                        "optional step failed, skipping"
                    );
                    steps_skipped += 1;
                }
            }
        }

        let screenshot = page.screenshot().await.ok();

        Ok(ReplayOutcome {
            steps_run,
            steps_skipped,
            duration_ms: started.elapsed().as_millis() as i64,
            screenshot,
        })
    }

    async fn run_step(
        &self,
        page: &dyn BrowserPage,
        step: &RecipeStep,
        profile: &UserProfile,
    ) -> Result<()> {
        if step.action == StepAction::Wait {
            let ms: u64 = step
                .value
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000);
            tokio::time::sleep(Duration::from_millis(ms.min(self.max_wait_ms))).await;
            return Ok(());
        }

        if !page
            .exists(&step.selector)
            .await
            .map_err(AutomationError::Browser)?
        {
            return Err(AutomationError::Browser(
                crate::error::BrowserError::SelectorNotFound {
                    selector: step.selector.clone(),
                },
            ));
        }

        let value = match &step.value {
            Some(template) => Some(interpolate(template, profile)?),
            None => None,
        };

        match step.action {
            StepAction::Type => {
                let value = value.unwrap_or_default();
                page.set_value(&step.selector, &value)
                    .await
                    .map_err(AutomationError::Browser)?;
            }
            StepAction::Select => {
                let value = value.unwrap_or_default();
                let matched = page
                    .select_option(&step.selector, &value)
                    .await
                    .map_err(AutomationError::Browser)?;
                if !matched {
                    return Err(AutomationError::Browser(
                        crate::error::BrowserError::SelectorNotFound {
                            selector: format!("{} option {:?}", step.selector, value),
                        },
                    ));
                }
            }
            StepAction::Radio | StepAction::Checkbox => {
                page.set_checked(&step.selector, true)
                    .await
                    .map_err(AutomationError::Browser)?;
            }
            StepAction::Click => {
                page.click(&step.selector)
                    .await
                    .map_err(AutomationError::Browser)?;
            }
            StepAction::Upload => {
                let path = value
                    .or_else(|| profile.resume_path.clone())
                    .ok_or_else(|| AutomationError::ProfileIncomplete {
                        field: "resume_path".to_string(),
                    })?;
                page.upload(&step.selector, &path)
                    .await
                    .map_err(AutomationError::Browser)?;
            }
            StepAction::Wait => unreachable!("handled above"),
        }

        Ok(())
    }
}
