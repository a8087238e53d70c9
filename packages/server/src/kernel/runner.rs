//! Per-job submission pipeline.
//!
//! One invocation takes an application from `QUEUED`/`RETRYING` through a
//! single attempt: validate the URL, acquire a browser, try the recorded
//! recipe when a usable one exists (falling back to the AI path in the
//! same pass), fill and submit, then persist the outcome atomically. The
//! browser is closed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use automation::error::AutomationError;
use automation::traits::{Browser, BrowserPage, BrowserProvider, FieldValueAi};
use automation::types::{
    FieldKind, FieldValue, Recipe, RecipeExecution, ReplayOutcome, UserProfile,
};
use automation::{
    backoff_delay_ms, classify, FailureKind, FieldValueGenerator, FormExtractor, FormFiller,
    RecipeEngine, UrlValidator,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domains::applications::{
    Application, ApplicationStore, ApplyMethod, AttemptOutcome, OutcomeKind, RecipeUpdate,
};
use crate::domains::collaborators::{JobPosting, JobPostingStore, ProfileStore};
use crate::domains::recipes::RecipeStore;
use crate::kernel::jobs::ApplyCommand;

/// Charged per LLM-driven attempt.
pub const AI_ATTEMPT_COST: f64 = 0.50;
/// Charged per recipe replay, an order of magnitude cheaper.
pub const RECIPE_ATTEMPT_COST: f64 = 0.05;

const FALLBACK_SUBMIT_SELECTOR: &str = "button[type=submit], input[type=submit]";

/// What the worker should tell the queue after one attempt.
#[derive(Debug)]
pub enum RunDecision {
    /// Application submitted, job done.
    Completed,
    /// Application was not in a runnable state; treat as done.
    Skipped,
    /// Transient failure, run again after the delay.
    Retry {
        kind: FailureKind,
        message: String,
        delay: Duration,
    },
    /// Terminal failure.
    Failed { kind: FailureKind, message: String },
}

/// Artifacts of a successful submission.
struct Submission {
    method: ApplyMethod,
    confirmation_id: String,
    screenshot: Option<Vec<u8>>,
}

/// Per-attempt accumulator: cost charged so far and the recipe statistics
/// to write alongside the outcome.
#[derive(Default)]
struct AttemptState {
    cost: f64,
    recipe: Option<RecipeUpdate>,
}

pub struct ApplicationRunner {
    applications: Arc<dyn ApplicationStore>,
    recipes: Arc<dyn RecipeStore>,
    profiles: Arc<dyn ProfileStore>,
    postings: Arc<dyn JobPostingStore>,
    browsers: Arc<dyn BrowserProvider>,
    ai: Arc<dyn FieldValueAi>,
    validator: UrlValidator,
    engine: RecipeEngine,
    extractor: FormExtractor,
    filler: FormFiller,
    screenshot_dir: PathBuf,
}

impl ApplicationRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationStore>,
        recipes: Arc<dyn RecipeStore>,
        profiles: Arc<dyn ProfileStore>,
        postings: Arc<dyn JobPostingStore>,
        browsers: Arc<dyn BrowserProvider>,
        ai: Arc<dyn FieldValueAi>,
        screenshot_dir: PathBuf,
    ) -> Self {
        Self {
            applications,
            recipes,
            profiles,
            postings,
            browsers,
            ai,
            validator: UrlValidator::new(),
            engine: RecipeEngine::new(),
            extractor: FormExtractor::new(),
            filler: FormFiller::new(),
            screenshot_dir,
        }
    }

    /// Execute one submission attempt for a queued command.
    pub async fn run(&self, command: &ApplyCommand) -> Result<RunDecision> {
        // Claim-check and transition atomically; a duplicate queue
        // delivery for an already-settled application lands here.
        let Some(application) = self.applications.mark_applying(command.application_id).await?
        else {
            info!(
                application_id = %command.application_id,
                "application not runnable, skipping"
            );
            return Ok(RunDecision::Skipped);
        };

        let mut state = AttemptState::default();

        // The URL gate runs before any browser resource is spent.
        if let Err(e) = self.validator.validate(&command.job_url) {
            return self.settle(&application, &state, Err(e.into())).await;
        }

        let preflight = match self.preflight(command).await {
            Ok(parts) => parts,
            Err(e) => return self.settle(&application, &state, Err(e)).await,
        };
        let (profile, posting) = preflight;

        let browser = match self.browsers.acquire().await {
            Ok(browser) => browser,
            Err(e) => return self.settle(&application, &state, Err(e.into())).await,
        };

        let attempt = self
            .attempt(browser.as_ref(), command, &profile, &posting, &mut state)
            .await;

        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser close failed after attempt");
        }

        self.settle(&application, &state, attempt).await
    }

    /// Load the profile and posting, mapping gaps to their failure kinds.
    async fn preflight(
        &self,
        command: &ApplyCommand,
    ) -> std::result::Result<(UserProfile, JobPosting), AutomationError> {
        let candidate = self
            .profiles
            .fetch(command.user_id)
            .await
            .map_err(|e| AutomationError::Storage(e.into()))?
            .ok_or(AutomationError::ProfileIncomplete {
                field: "profile".to_string(),
            })?;
        if candidate.credits <= 0 {
            return Err(AutomationError::InsufficientCredits);
        }

        let posting = self
            .postings
            .fetch(command.job_id)
            .await
            .map_err(|e| AutomationError::Storage(e.into()))?
            .ok_or(AutomationError::JobNotFound {
                url: command.job_url.clone(),
            })?;
        if !posting.open {
            return Err(AutomationError::JobClosed {
                url: command.job_url.clone(),
            });
        }

        Ok((candidate.profile, posting))
    }

    /// One browser-backed attempt: navigate, pick a strategy, submit.
    async fn attempt(
        &self,
        browser: &dyn Browser,
        command: &ApplyCommand,
        profile: &UserProfile,
        posting: &JobPosting,
        state: &mut AttemptState,
    ) -> std::result::Result<Submission, AutomationError> {
        let page = browser.new_page().await?;
        page.navigate(&command.job_url).await?;

        let recipe = self
            .recipes
            .find_usable(&command.ats)
            .await
            .map_err(|e| AutomationError::Storage(e.into()))?;

        if let Some(recipe) = recipe {
            match self.replay_recipe(page.as_ref(), recipe, profile, state).await {
                Ok(submission) => return Ok(submission),
                // Only a recipe-specific failure is worth working around
                // with the AI path; anything else (crash, network) would
                // hit the AI fill too and belongs to the retry policy.
                Err(e) if classify(&e).kind.is_recipe_specific() => {
                    warn!(
                        platform = %command.ats,
                        error = %e,
                        "recipe replay failed, falling back to AI fill"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.ai_fill(page.as_ref(), command, profile, posting, state)
            .await
    }

    /// Replay the platform recipe. Statistics are folded in memory and
    /// carried on the attempt state so they commit with the outcome.
    async fn replay_recipe(
        &self,
        page: &dyn BrowserPage,
        mut recipe: Recipe,
        profile: &UserProfile,
        state: &mut AttemptState,
    ) -> std::result::Result<Submission, AutomationError> {
        state.cost += RECIPE_ATTEMPT_COST;
        let lead_selector = recipe
            .steps
            .first()
            .map(|s| s.selector.clone())
            .unwrap_or_default();
        let result = self.engine.replay(page, &recipe, profile).await;

        // A pass where no step ran filled nothing; that is a failed
        // replay even though the engine returned cleanly.
        let success = matches!(&result, Ok(outcome) if outcome.complete());
        let (duration_ms, error) = match &result {
            Ok(outcome) if outcome.complete() => (outcome.duration_ms, None),
            Ok(outcome) => (
                outcome.duration_ms,
                Some("no recipe step executed".to_string()),
            ),
            Err(e) => (0, Some(e.to_string())),
        };

        // Infrastructure failures mid-replay (crash, network) are not
        // the recording's fault and leave its statistics alone.
        let attributable = match &result {
            Ok(_) => true,
            Err(e) => classify(e).kind.is_recipe_specific(),
        };
        if attributable {
            recipe.record_outcome(success);
            let recipe_id = recipe.id;
            state.recipe = Some(RecipeUpdate {
                recipe,
                execution: RecipeExecution {
                    id: Uuid::new_v4(),
                    recipe_id,
                    success,
                    cost: RECIPE_ATTEMPT_COST,
                    duration_ms,
                    error,
                    executed_at: Utc::now(),
                },
            });
        }

        let outcome: ReplayOutcome = result?;
        if !outcome.complete() {
            return Err(AutomationError::RecipeSelectorStale {
                selector: lead_selector,
            });
        }
        let screenshot = match outcome.screenshot {
            Some(bytes) => Some(bytes),
            None => page.screenshot().await.ok(),
        };
        Ok(Submission {
            method: ApplyMethod::Recipe,
            confirmation_id: self.confirmation_id(page).await,
            screenshot,
        })
    }

    /// The AI path: extract the form, generate values, fill, gate on
    /// required coverage, submit.
    async fn ai_fill(
        &self,
        page: &dyn BrowserPage,
        command: &ApplyCommand,
        profile: &UserProfile,
        posting: &JobPosting,
        state: &mut AttemptState,
    ) -> std::result::Result<Submission, AutomationError> {
        state.cost += AI_ATTEMPT_COST;

        let form = self.extractor.extract(page).await?;
        if form.captcha_detected {
            return Err(AutomationError::Captcha {
                reason: "challenge widget present on page".to_string(),
                solvable: true,
            });
        }
        if form.is_empty() {
            return Err(AutomationError::FormNotFound {
                url: command.job_url.clone(),
            });
        }

        let generator = FieldValueGenerator::new(self.ai.clone());
        let mut values = generator
            .generate(&form.fields, profile, &posting.description)
            .await?;

        if let Some(path) = &profile.resume_path {
            for field in form.fields.iter().filter(|f| f.kind == FieldKind::File) {
                values
                    .entry(field.name.clone())
                    .or_insert_with(|| FieldValue::Single(path.clone()));
            }
        }

        let result = self.filler.fill(page, &form.fields, &values).await?;
        let required: Vec<&str> = form.required_fields().map(|f| f.name.as_str()).collect();
        if !result.covers_required(required.iter().copied()) {
            let filled: std::collections::HashSet<&str> =
                result.filled.iter().map(|o| o.name.as_str()).collect();
            let missing = required
                .iter()
                .find(|name| !filled.contains(**name))
                .copied()
                .unwrap_or("unknown");
            return Err(AutomationError::ProfileIncomplete {
                field: missing.to_string(),
            });
        }

        info!(
            filled = result.filled_count(),
            skipped = result.skipped_count(),
            errors = result.error_count(),
            "form filled, submitting"
        );

        let submit = form
            .submit_selector
            .as_deref()
            .unwrap_or(FALLBACK_SUBMIT_SELECTOR);
        page.click(submit).await?;

        Ok(Submission {
            method: ApplyMethod::Ai,
            confirmation_id: self.confirmation_id(page).await,
            screenshot: page.screenshot().await.ok(),
        })
    }

    /// Post-submit page URL doubles as the confirmation receipt; a fresh
    /// id stands in when the page cannot report one.
    async fn confirmation_id(&self, page: &dyn BrowserPage) -> String {
        match page.current_url().await {
            Ok(url) if !url.is_empty() => url,
            _ => format!("conf-{}", Uuid::new_v4()),
        }
    }

    /// Persist the attempt outcome and translate it into a queue decision.
    async fn settle(
        &self,
        application: &Application,
        state: &AttemptState,
        attempt: std::result::Result<Submission, AutomationError>,
    ) -> Result<RunDecision> {
        match attempt {
            Ok(submission) => {
                let screenshot_path = match submission.screenshot {
                    Some(bytes) => self.store_screenshot(application.id, &bytes).await,
                    None => None,
                };
                self.applications
                    .persist_outcome(&AttemptOutcome {
                        application_id: application.id,
                        kind: OutcomeKind::Submitted {
                            method: submission.method,
                            confirmation_id: submission.confirmation_id,
                            screenshot_path,
                        },
                        cost: state.cost,
                        recipe: state.recipe.clone(),
                    })
                    .await
                    .context("failed to persist submission")?;
                info!(application_id = %application.id, method = ?submission.method, "application submitted");
                Ok(RunDecision::Completed)
            }
            Err(error) => {
                let policy = classify(&error);
                let message = error.to_string();
                let attempts_made = application.retry_count as u32 + 1;
                let retry = policy.retryable && attempts_made < policy.max_attempts;

                let kind = if retry {
                    OutcomeKind::Retry {
                        error_kind: policy.kind.to_string(),
                        error_message: message.clone(),
                    }
                } else {
                    // Terminal failures surface the policy's message, never
                    // a raw internal error string.
                    OutcomeKind::Failed {
                        error_kind: policy.kind.to_string(),
                        error_message: policy.user_message.to_string(),
                    }
                };
                self.applications
                    .persist_outcome(&AttemptOutcome {
                        application_id: application.id,
                        kind,
                        cost: state.cost,
                        recipe: state.recipe.clone(),
                    })
                    .await
                    .context("failed to persist failure")?;

                if retry {
                    let delay =
                        Duration::from_millis(backoff_delay_ms(&policy, application.retry_count as u32));
                    warn!(
                        application_id = %application.id,
                        kind = %policy.kind,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, retrying"
                    );
                    Ok(RunDecision::Retry {
                        kind: policy.kind,
                        message,
                        delay,
                    })
                } else {
                    warn!(
                        application_id = %application.id,
                        kind = %policy.kind,
                        "attempt failed terminally"
                    );
                    Ok(RunDecision::Failed {
                        kind: policy.kind,
                        message,
                    })
                }
            }
        }
    }

    async fn store_screenshot(&self, application_id: Uuid, bytes: &[u8]) -> Option<String> {
        let path = self.screenshot_dir.join(format!("{application_id}.png"));
        if let Err(e) = tokio::fs::create_dir_all(&self.screenshot_dir).await {
            warn!(error = %e, "could not create screenshot directory");
            return None;
        }
        match tokio::fs::write(&path, bytes).await {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(error = %e, "could not write confirmation screenshot");
                None
            }
        }
    }
}
